//! Rate limiter trait for abstracting over store backends.

use async_trait::async_trait;

use super::Decision;

/// Trait for rate limiter implementations.
///
/// Lets callers hold a limiter as `Arc<dyn RateLimiterBackend>` without
/// naming the store it is backed by.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for a given identifier.
    async fn check(&self, identifier: &str) -> Decision;
}
