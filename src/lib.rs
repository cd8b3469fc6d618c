//! NetRecon rate limiter
//!
//! Fixed-window rate limiting for many independent callers sharing one
//! counter store. Every check atomically increments a per-identifier
//! counter in the store; the counter's time-to-live bounds the window.
//! When the store cannot be reached the limiter fails open.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use crate::config::LimiterConfig;
pub use crate::error::{LimiterError, Result};
pub use crate::ratelimit::{Decision, FixedWindowLimiter, RateLimiterBackend};
