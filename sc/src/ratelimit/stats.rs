//! Rate limiter usage snapshots

use std::collections::BTreeMap;

use serde::Serialize;

/// Recorded calls in the trailing windows vs the configured ceilings
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowUsage {
    pub last_minute: usize,
    pub per_minute_limit: u32,
    pub last_hour: usize,
    pub per_hour_limit: u32,
}

/// Usage for one configured source
#[derive(Debug, Clone, Serialize)]
pub struct SourceUsage {
    #[serde(flatten)]
    pub window: WindowUsage,

    /// Current token level, at most `burst_size`
    pub tokens: f64,
    pub burst_size: u32,

    /// Whether a failure-driven backoff window is currently active
    pub in_backoff: bool,
}

/// Point-in-time view of the limiter, taken after the batch drains
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub enabled: bool,
    pub global: WindowUsage,
    pub sources: BTreeMap<String, SourceUsage>,
}

impl std::fmt::Display for RateLimiterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.enabled {
            return writeln!(f, "Rate limiting: disabled");
        }
        writeln!(f, "Rate limiter:")?;
        writeln!(
            f,
            "  global      {}/{} rpm, {}/{} rph",
            self.global.last_minute,
            self.global.per_minute_limit,
            self.global.last_hour,
            self.global.per_hour_limit
        )?;
        for (source, usage) in &self.sources {
            write!(
                f,
                "  {:<12}{}/{} rpm, {}/{} rph, tokens {:.1}/{}",
                source,
                usage.window.last_minute,
                usage.window.per_minute_limit,
                usage.window.last_hour,
                usage.window.per_hour_limit,
                usage.tokens,
                usage.burst_size
            )?;
            if usage.in_backoff {
                write!(f, " (backing off)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
