//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CounterStore, StoreConnector};
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

/// Run a store round trip under `limit`, mapping an elapsed timer to
/// [`LimiterError::Timeout`].
async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(LimiterError::from),
        Err(_) => Err(LimiterError::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Opens [`RedisStore`] connections to a single Redis endpoint.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl RedisConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            operation_timeout,
        }
    }

    /// Build a connector from the endpoint and timeouts in `config`.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(
            config.redis_url.clone(),
            config.connect_timeout(),
            config.operation_timeout(),
        )
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    type Store = RedisStore;

    async fn connect(&self) -> Result<RedisStore> {
        let client = redis::Client::open(self.url.as_str()).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client for rate limiting");
            LimiterError::Unavailable(format!("invalid Redis endpoint: {}", e))
        })?;

        let connection_manager =
            bounded("connect", self.connect_timeout, ConnectionManager::new(client)).await?;

        debug!(endpoint = %self.url, "Opened Redis connection for rate limiting");

        Ok(RedisStore {
            connection_manager,
            operation_timeout: self.operation_timeout,
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// A multiplexed Redis connection implementing [`CounterStore`].
///
/// Cloning the underlying [`ConnectionManager`] is cheap and shares the
/// same socket, so every call clones it instead of locking.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    operation_timeout: Duration,
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let reply: String = bounded(
            "ping",
            self.operation_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(LimiterError::Unavailable(format!(
                "unexpected PING reply: {}",
                reply
            )))
        }
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection_manager.clone();
        let value: i64 = bounded(
            "increment",
            self.operation_timeout,
            redis::cmd("INCR").arg(key).query_async(&mut conn),
        )
        .await?;
        Ok(value)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let armed: bool = bounded(
            "set_expiry",
            self.operation_timeout,
            redis::cmd("EXPIRE").arg(key).arg(seconds).query_async(&mut conn),
        )
        .await?;
        Ok(armed)
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.connection_manager.clone();
        let ttl: i64 = bounded(
            "get_ttl",
            self.operation_timeout,
            redis::cmd("TTL").arg(key).query_async(&mut conn),
        )
        .await?;

        // -2: key missing, -1: key has no expiry
        Ok(if ttl >= 0 { Some(ttl) } else { None })
    }
}
