//! Error types for the rate limiter.

use std::time::Duration;
use thiserror::Error;

/// Main error type for rate limiter operations.
///
/// None of these ever reach the caller of
/// [`FixedWindowLimiter::check`](crate::ratelimit::FixedWindowLimiter::check);
/// they surface from configuration loading and from the store layer, where
/// the limiter converts them into a fail-open decision.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the Redis counter store
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// A store round trip did not finish in time
    #[error("Store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The store could not be reached or rejected the liveness probe
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rate limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
