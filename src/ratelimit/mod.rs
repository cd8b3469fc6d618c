//! Rate limiting policy.

mod backend;
mod decision;
mod key;
mod limiter;

pub use backend::RateLimiterBackend;
pub use decision::Decision;
pub use key::CounterKey;
pub use limiter::FixedWindowLimiter;
