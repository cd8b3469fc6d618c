//! In-process counter store.
//!
//! Mirrors the Redis semantics the limiter relies on (`INCR`, `EXPIRE`,
//! `TTL`) for single-instance deployments and tests. State is not shared
//! across processes.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::{CounterStore, StoreConnector};
use crate::error::Result;

/// A counter value and the instant the store forgets it.
#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterRecord {
    fn new() -> Self {
        Self {
            value: 0,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Whole seconds until expiry, rounded up so a live key never reports 0.
    fn ttl_secs(&self, now: Instant) -> Option<i64> {
        let remaining = self.expires_at?.checked_duration_since(now)?;
        if remaining.is_zero() {
            return None;
        }
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Some(secs as i64)
    }
}

/// Increments between sweeps of expired records.
const DEFAULT_PURGE_EVERY: u64 = 1024;

/// Thread-safe expiring counters.
///
/// Clones share the same underlying map. Increments on one key are
/// serialized by the map's per-shard lock, so concurrent callers observe
/// gapless, strictly increasing values. Every `purge_every` increments the
/// store sweeps out expired records, so identifiers that stop calling do
/// not stay resident.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    counters: Arc<DashMap<String, CounterRecord>>,
    increments: Arc<AtomicU64>,
    purge_every: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_purge_every(DEFAULT_PURGE_EVERY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that sweeps expired records every `purge_every`
    /// increments. Zero is treated as one.
    pub fn with_purge_every(purge_every: u64) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            increments: Arc::new(AtomicU64::new(0)),
            purge_every: purge_every.max(1),
        }
    }

    /// Number of records currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop every record whose time-to-live has elapsed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Current value of a live counter.
    pub fn value(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        // Sweep before taking the entry guard; `retain` locks every shard.
        let seen = self.increments.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.purge_every == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                trace!(purged = purged, "Purged expired counters");
            }
        }

        let now = Instant::now();
        let mut record = self
            .counters
            .entry(key.to_string())
            .or_insert_with(CounterRecord::new);

        if record.is_expired(now) {
            *record = CounterRecord::new();
        }
        record.value += 1;
        Ok(record.value)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool> {
        let now = Instant::now();
        let armed = match self.counters.get_mut(key) {
            Some(mut record) if !record.is_expired(now) => {
                record.expires_at = Some(now + Duration::from_secs(seconds));
                true
            }
            _ => false,
        };

        if !armed {
            self.counters.remove_if(key, |_, record| record.is_expired(now));
        }
        Ok(armed)
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<i64>> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .and_then(|record| record.ttl_secs(now)))
    }
}

/// Hands out clones of one shared [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore> {
        Ok(self.store.clone())
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}
