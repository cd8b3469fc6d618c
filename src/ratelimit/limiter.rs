//! Fixed-window rate limiter over a shared counter store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::config::LimiterConfig;
use crate::error::Result;
use crate::store::{CounterStore, RedisConnector, StoreClient, StoreConnector};

use super::backend::RateLimiterBackend;
use super::decision::{Decision, Degraded, Outcome};
use super::key::CounterKey;

/// Decides allow/deny for identifiers against a fixed window counter.
///
/// Each check increments the identifier's counter in the store. The
/// increment that creates the counter arms its expiry to the window
/// length; the store deleting the counter is what starts the next window.
/// All shared state lives in the store, so one limiter can be called from
/// any number of tasks, and any number of processes can share a store.
///
/// Infrastructure failures never deny traffic: if the store is
/// unreachable or an operation fails, the request is allowed without
/// quota metadata.
pub struct FixedWindowLimiter<C: StoreConnector> {
    config: LimiterConfig,
    store: Arc<StoreClient<C>>,
}

impl FixedWindowLimiter<RedisConnector> {
    /// Create a limiter backed by the Redis endpoint in `config`.
    pub fn from_config(config: LimiterConfig) -> Result<Self> {
        let connector = RedisConnector::from_config(&config);
        Self::new(config, connector)
    }
}

impl<C: StoreConnector> FixedWindowLimiter<C> {
    /// Create a limiter with its own store client.
    pub fn new(config: LimiterConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(StoreClient::with_config(connector, &config));
        Ok(Self { config, store })
    }

    /// Create a limiter sharing an existing store client, so several limits
    /// can be enforced over one process-wide connection.
    pub fn with_client(config: LimiterConfig, store: Arc<StoreClient<C>>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StoreClient<C>> {
        &self.store
    }

    /// Check the rate limit for `identifier`, counting this call.
    pub async fn check(&self, identifier: &str) -> Decision {
        let outcome = self.evaluate(identifier).await;
        log_outcome(identifier, &outcome);
        outcome.into()
    }

    pub(crate) async fn evaluate(&self, identifier: &str) -> Outcome {
        if !self.config.enabled {
            return Outcome::Disabled;
        }

        let Some(store) = self.store.get_connection().await else {
            return Outcome::Indeterminate(Degraded::StoreUnavailable);
        };

        match self.count(store.as_ref(), identifier).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    identifier = %identifier,
                    error = %e,
                    "Rate limiting check failed, allowing request"
                );
                Outcome::Indeterminate(Degraded::StoreError)
            }
        }
    }

    /// Run the increment protocol for one identifier.
    async fn count(&self, store: &C::Store, identifier: &str) -> Result<Outcome> {
        let key = CounterKey::new(&self.config.key_prefix, identifier);
        let window = self.config.window_seconds;
        let limit = self.config.requests_per_window;

        let current = store.increment(key.as_str()).await?;

        if current == 1 {
            // Only the increment that created the record arms the window.
            match store.set_expiry(key.as_str(), window).await {
                Ok(true) => {}
                Ok(false) => debug!(key = %key, "Counter vanished before its expiry was set"),
                Err(e) => warn!(
                    key = %key,
                    error = %e,
                    "Failed to set counter expiry; counter will not expire on its own"
                ),
            }
        }

        let count = u64::try_from(current).unwrap_or(0);

        if count > limit {
            let ttl = store.get_ttl(key.as_str()).await?;
            let retry_after = match ttl {
                Some(secs) if secs > 0 => secs as u64,
                // Expired between the increment and the ttl read, or never armed.
                _ => window,
            };
            return Ok(Outcome::Denied { count, retry_after });
        }

        Ok(Outcome::Allowed {
            count,
            remaining: limit.saturating_sub(count),
        })
    }
}

fn log_outcome(identifier: &str, outcome: &Outcome) {
    match *outcome {
        Outcome::Disabled => trace!(identifier = %identifier, "Rate limiting disabled"),
        Outcome::Allowed { count, remaining } => trace!(
            identifier = %identifier,
            count = count,
            remaining = remaining,
            "Request within rate limit"
        ),
        Outcome::Denied { count, retry_after } => debug!(
            identifier = %identifier,
            count = count,
            retry_after = retry_after,
            "Rate limit exceeded"
        ),
        Outcome::Indeterminate(Degraded::StoreUnavailable) => debug!(
            identifier = %identifier,
            "Counter store unavailable, allowing request"
        ),
        Outcome::Indeterminate(Degraded::StoreError) => {}
    }
}

#[async_trait]
impl<C: StoreConnector + 'static> RateLimiterBackend for FixedWindowLimiter<C> {
    async fn check(&self, identifier: &str) -> Decision {
        FixedWindowLimiter::check(self, identifier).await
    }
}
