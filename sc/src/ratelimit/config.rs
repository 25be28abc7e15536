//! Rate limiter configuration

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Admission-control configuration, global and per source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch; disabled means every acquire admits immediately
    pub enabled: bool,

    pub global_limits: GlobalLimits,

    /// Sources without an entry here are subject to global limits only
    pub source_limits: HashMap<String, SourceLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_limits: GlobalLimits::default(),
            source_limits: HashMap::new(),
        }
    }
}

/// Process-wide ceilings across all sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

impl Default for GlobalLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
        }
    }
}

/// Per-source ceilings, burst allowance, and spacing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,

    /// Token bucket capacity; refills at requests_per_minute / 60 per second
    pub burst_size: u32,

    /// Minimum gap between consecutive calls to this source
    pub min_delay_seconds: f64,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            requests_per_hour: 600,
            burst_size: 5,
            min_delay_seconds: 1.0,
        }
    }
}
