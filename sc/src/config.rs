//! Coordinator configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ratelimit::RateLimitConfig;
use crate::scoring::WeightingConfig;

/// Main coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admission control limits
    pub rate_limiting: RateLimitConfig,

    /// Dispatch behavior
    pub task_processing: TaskProcessingConfig,

    /// Downstream reconciliation trigger
    pub reconciliation: ReconciliationConfig,
}

impl Config {
    /// Validate configuration before use.
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.task_processing.max_concurrent == 0 {
            return Err(eyre::eyre!("task_processing.max_concurrent must be at least 1"));
        }
        for (source, limits) in &self.rate_limiting.source_limits {
            if !limits.min_delay_seconds.is_finite() || limits.min_delay_seconds < 0.0 {
                return Err(eyre::eyre!(
                    "source_limits.{}.min_delay_seconds must be a non-negative number",
                    source
                ));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .scrapecoord.yml
        let local_config = PathBuf::from(".scrapecoord.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/scrapecoord/scrapecoord.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scrapecoord").join("scrapecoord.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Dispatch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProcessingConfig {
    /// Worker pool width
    pub max_concurrent: usize,

    /// Probe the limiter at dispatch and skip (rather than queue behind)
    /// tasks whose source is currently throttled
    pub skip_when_throttled: bool,

    /// Score-ordered dispatch; tier-by-tier when disabled
    pub priority_weighting: WeightingConfig,
}

impl Default for TaskProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            skip_when_throttled: false,
            priority_weighting: WeightingConfig::default(),
        }
    }
}

/// Downstream reconciliation trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Command to run after a batch; nothing is triggered when unset
    pub command: Option<String>,

    pub args: Vec<String>,

    pub timeout_seconds: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_seconds: 600,
        }
    }
}
