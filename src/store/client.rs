//! Lazily-established, process-wide handle to the counter store.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, trace};

use super::{CounterStore, StoreConnector};
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

/// What to do after a connection attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Treat the store as unavailable for the rest of the process lifetime.
    Latch,
    /// Try again at most once per `interval`; calls in between fail fast.
    Reprobe { interval: Duration },
}

/// Lifecycle of the store connection.
#[derive(Debug)]
pub enum ConnectionState<S> {
    /// No connection attempt has been made yet.
    Uninitialized,
    /// Connected and probed; handed out to every caller from now on.
    Connected(Arc<S>),
    /// The last attempt failed at `since`.
    Failed { since: Instant },
}

impl<S> Clone for ConnectionState<S> {
    fn clone(&self) -> Self {
        match self {
            ConnectionState::Uninitialized => ConnectionState::Uninitialized,
            ConnectionState::Connected(store) => ConnectionState::Connected(store.clone()),
            ConnectionState::Failed { since } => ConnectionState::Failed { since: *since },
        }
    }
}

impl<S> ConnectionState<S> {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// The shared counter store client.
///
/// The first call to [`get_connection`](Self::get_connection) connects and
/// probes the store; the result is cached. A healthy handle is reused for
/// every later call without re-validation. A failed attempt is cached too,
/// and later calls fail fast according to the [`ReconnectPolicy`].
pub struct StoreClient<C: StoreConnector> {
    connector: C,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    state: RwLock<ConnectionState<C::Store>>,
    /// Serializes connection attempts so concurrent first callers share one.
    init: Mutex<()>,
}

impl<C: StoreConnector> StoreClient<C> {
    pub fn new(connector: C, policy: ReconnectPolicy, connect_timeout: Duration) -> Self {
        Self {
            connector,
            policy,
            connect_timeout,
            state: RwLock::new(ConnectionState::Uninitialized),
            init: Mutex::new(()),
        }
    }

    /// Create a client using the reconnect policy and timeout from `config`.
    pub fn with_config(connector: C, config: &LimiterConfig) -> Self {
        Self::new(connector, config.reconnect_policy(), config.connect_timeout())
    }

    /// Return the store handle, connecting on first use.
    ///
    /// `None` means the store is unavailable. This never returns an error.
    pub async fn get_connection(&self) -> Option<Arc<C::Store>> {
        if let Some(cached) = self.cached() {
            return cached;
        }

        let _guard = self.init.lock().await;
        // Another caller may have finished an attempt while we waited.
        if let Some(cached) = self.cached() {
            return cached;
        }

        let endpoint = self.connector.endpoint();
        match self.establish().await {
            Ok(store) => {
                info!(endpoint = %endpoint, "Connected to counter store for rate limiting");
                let store = Arc::new(store);
                *self.state.write() = ConnectionState::Connected(store.clone());
                Some(store)
            }
            Err(e) => {
                error!(
                    endpoint = %endpoint,
                    error = %e,
                    policy = ?self.policy,
                    "Failed to connect to counter store for rate limiting"
                );
                *self.state.write() = ConnectionState::Failed {
                    since: Instant::now(),
                };
                None
            }
        }
    }

    /// Snapshot of the current connection state.
    pub fn state(&self) -> ConnectionState<C::Store> {
        self.state.read().clone()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// `Some(answer)` when the cached state decides the call, `None` when a
    /// connection attempt is due.
    fn cached(&self) -> Option<Option<Arc<C::Store>>> {
        match &*self.state.read() {
            ConnectionState::Uninitialized => None,
            ConnectionState::Connected(store) => Some(Some(store.clone())),
            ConnectionState::Failed { since } => match self.policy {
                ReconnectPolicy::Latch => {
                    trace!("Counter store marked unavailable");
                    Some(None)
                }
                ReconnectPolicy::Reprobe { interval } if since.elapsed() < interval => {
                    trace!("Counter store unavailable, reprobe not yet due");
                    Some(None)
                }
                ReconnectPolicy::Reprobe { .. } => None,
            },
        }
    }

    /// Connect and probe, bounded by the connect timeout.
    async fn establish(&self) -> Result<C::Store> {
        let attempt = async {
            let store = self.connector.connect().await?;
            store.ping().await?;
            Ok::<_, LimiterError>(store)
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(LimiterError::Timeout {
                operation: "connect",
                after: self.connect_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::ScriptedConnector;

    fn client(connector: ScriptedConnector, policy: ReconnectPolicy) -> StoreClient<ScriptedConnector> {
        StoreClient::new(connector, policy, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let client = client(ScriptedConnector::default(), ReconnectPolicy::Latch);
        assert!(matches!(client.state(), ConnectionState::Uninitialized));
    }

    #[tokio::test]
    async fn test_connects_once_and_reuses_handle() {
        let connector = ScriptedConnector::default();
        let client = client(connector.clone(), ReconnectPolicy::Latch);

        let first = client.get_connection().await.unwrap();
        let second = client.get_connection().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.attempts(), 1);
        assert!(client.state().is_connected());
    }

    #[tokio::test]
    async fn test_failed_probe_latches() {
        let connector = ScriptedConnector::default();
        connector.set(|f| &f.fail_ping, true);
        let client = client(connector.clone(), ReconnectPolicy::Latch);

        assert!(client.get_connection().await.is_none());
        assert!(client.state().is_failed());

        // The store recovering does not matter once latched.
        connector.set(|f| &f.fail_ping, false);
        for _ in 0..5 {
            assert!(client.get_connection().await.is_none());
        }
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reprobe_after_interval() {
        let connector = ScriptedConnector::default();
        connector.set(|f| &f.refuse_connect, true);
        let client = client(
            connector.clone(),
            ReconnectPolicy::Reprobe {
                interval: Duration::from_secs(30),
            },
        );

        assert!(client.get_connection().await.is_none());
        connector.set(|f| &f.refuse_connect, false);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(client.get_connection().await.is_none());
        assert_eq!(connector.attempts(), 1);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(client.get_connection().await.is_some());
        assert_eq!(connector.attempts(), 2);
        assert!(client.state().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_marks_failed() {
        let connector = ScriptedConnector {
            connect_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let client = client(connector.clone(), ReconnectPolicy::Latch);

        assert!(client.get_connection().await.is_none());
        assert!(client.state().is_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_callers_share_one_attempt() {
        let connector = ScriptedConnector {
            connect_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let client = Arc::new(client(connector.clone(), ReconnectPolicy::Latch));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get_connection().await.is_some() })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap());
        }
        assert_eq!(connector.attempts(), 1);
    }
}
