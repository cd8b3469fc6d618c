//! Shared counter store abstraction.
//!
//! The limiter only ever needs four primitives from the external store:
//! an atomic increment, a conditional expiry, a time-to-live query and a
//! liveness probe. [`CounterStore`] captures exactly those, and
//! [`StoreClient`] owns the lifecycle of the one connection a process
//! holds to the store.

mod client;
mod memory;
mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{ConnectionState, ReconnectPolicy, StoreClient};
pub use memory::{MemoryConnector, MemoryStore};
pub use redis_store::{RedisConnector, RedisStore};

/// A connection to a store holding expiring integer counters.
///
/// Every method is a single round trip and is never retried internally.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Cheap round trip used to check that the store answers.
    async fn ping(&self) -> Result<()>;

    /// Atomically increment the counter at `key`, creating it at 1 when it
    /// does not exist, and return the new value.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Arm a time-to-live on `key`. Returns `false` when the key does not exist.
    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<bool>;

    /// Remaining time-to-live of `key` in seconds, or `None` when the key is
    /// missing or has no expiry.
    async fn get_ttl(&self, key: &str) -> Result<Option<i64>>;
}

/// Establishes connections to a [`CounterStore`].
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: CounterStore + 'static;

    /// Open a connection. The caller probes it before use.
    async fn connect(&self) -> Result<Self::Store>;

    /// Endpoint description for log output.
    fn endpoint(&self) -> String;
}
