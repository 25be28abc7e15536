//! Weighted task scoring
//!
//! When priority weighting is enabled the orchestrator processes tasks in
//! descending score order instead of strict tier order. The score blends the
//! tier's base value with task age, a per-source multiplier, a capped gap-size
//! penalty, and the scraper's historical success rate. Pure and total: a task
//! with missing or malformed optional fields simply earns no contribution
//! from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Priority, Task};

/// Priority-weighting knobs under `task_processing.priority_weighting`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingConfig {
    pub enabled: bool,

    /// Per-tier base scores; tiers absent here use the built-in defaults
    pub base_scores: BTreeMap<Priority, f64>,

    /// Score added per hour since the gap was detected
    pub age_weight: f64,

    /// Multiplier applied after the age bonus; unlisted sources use 1.0
    pub source_multipliers: BTreeMap<String, f64>,

    /// Negative weight per missing record; the resulting penalty is capped
    pub gap_size_weight: f64,
    pub max_gap_size_penalty: f64,

    pub success_rate_weight: f64,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_scores: BTreeMap::new(),
            age_weight: 0.5,
            source_multipliers: BTreeMap::new(),
            gap_size_weight: -0.5,
            max_gap_size_penalty: 50.0,
            success_rate_weight: 20.0,
        }
    }
}

impl WeightingConfig {
    fn base_score(&self, priority: Priority) -> f64 {
        self.base_scores.get(&priority).copied().unwrap_or(match priority {
            Priority::Critical => 1000.0,
            Priority::High => 100.0,
            Priority::Medium => 10.0,
            Priority::Low => 1.0,
        })
    }
}

/// Score a task for dispatch ordering. Higher scores run first.
pub fn score(task: &Task, weights: &WeightingConfig, now: DateTime<Utc>) -> f64 {
    let mut score = weights.base_score(task.priority);

    if let Some(detected) = task.detected_time() {
        let hours = (now - detected).num_milliseconds() as f64 / 3_600_000.0;
        if hours > 0.0 {
            score += hours * weights.age_weight;
        }
    }

    score *= weights.source_multipliers.get(&task.source).copied().unwrap_or(1.0);

    if let Some(gap) = task.gap_size {
        score += (gap as f64 * weights.gap_size_weight).clamp(-weights.max_gap_size_penalty.abs(), 0.0);
    }

    if let Some(rate) = task.success_rate {
        score += rate * weights.success_rate_weight;
    }

    score
}
