//! Rate-limit admission control
//!
//! Decides whether a call to a given source may proceed now, combining
//! global and per-source sliding windows, a per-source token bucket, minimum
//! spacing, and failure-driven backoff.

mod config;
mod limiter;
mod stats;

pub use config::{GlobalLimits, RateLimitConfig, SourceLimits};
pub use limiter::RateLimiter;
pub use stats::{RateLimiterSnapshot, SourceUsage, WindowUsage};
