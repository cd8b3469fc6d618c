//! Fault-injecting store used by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CounterStore, MemoryStore, StoreConnector};
use crate::error::{LimiterError, Result};

/// Switches shared between a connector and every store it hands out.
#[derive(Debug, Default)]
pub struct Faults {
    pub refuse_connect: AtomicBool,
    pub fail_ping: AtomicBool,
    pub fail_increment: AtomicBool,
    pub fail_expire: AtomicBool,
    pub fail_ttl: AtomicBool,
    /// Report "no ttl" even for keys that have one
    pub hide_ttl: AtomicBool,
    /// Report a ttl of zero, as for a key expiring mid-check
    pub zero_ttl: AtomicBool,
}

fn injected(operation: &str) -> LimiterError {
    LimiterError::Unavailable(format!("injected {} failure", operation))
}

#[derive(Debug, Clone)]
pub struct ScriptedStore {
    inner: MemoryStore,
    faults: Arc<Faults>,
    store_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CounterStore for ScriptedStore {
    async fn ping(&self) -> Result<()> {
        if self.faults.fail_ping.load(Ordering::SeqCst) {
            return Err(injected("ping"));
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_increment.load(Ordering::SeqCst) {
            return Err(injected("increment"));
        }
        self.inner.increment(key).await
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_expire.load(Ordering::SeqCst) {
            return Err(injected("set_expiry"));
        }
        self.inner.set_expiry(key, seconds).await
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<i64>> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_ttl.load(Ordering::SeqCst) {
            return Err(injected("get_ttl"));
        }
        if self.faults.hide_ttl.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.faults.zero_ttl.load(Ordering::SeqCst) {
            return Ok(Some(0));
        }
        self.inner.get_ttl(key).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    pub inner: MemoryStore,
    pub faults: Arc<Faults>,
    pub connect_attempts: Arc<AtomicUsize>,
    pub store_calls: Arc<AtomicUsize>,
    pub connect_delay: Option<Duration>,
}

impl ScriptedConnector {
    pub fn set(&self, flag: impl Fn(&Faults) -> &AtomicBool, value: bool) {
        flag(&self.faults).store(value, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for ScriptedConnector {
    type Store = ScriptedStore;

    async fn connect(&self) -> Result<ScriptedStore> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.refuse_connect.load(Ordering::SeqCst) {
            return Err(injected("connect"));
        }
        Ok(ScriptedStore {
            inner: self.inner.clone(),
            faults: self.faults.clone(),
            store_calls: self.store_calls.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "scripted".to_string()
    }
}
