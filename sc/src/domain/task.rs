//! Task queue loading
//!
//! The upstream gap detector emits a JSON task queue. Entries are validated
//! here, once, at load; malformed entries are quarantined with a warning so a
//! single bad record cannot abort a batch mid-flight.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::priority::Priority;

fn default_estimated_time_minutes() -> f64 {
    10.0
}

/// A single collection task produced by the upstream gap detector.
///
/// Immutable after load. Fields beyond the known set are kept in `params`
/// and forwarded to the scraper subject to its parameter whitelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub priority: Priority,

    /// Registry name of the scraper that fills this gap
    pub scraper: String,

    /// Rate-limited upstream source the scraper talks to
    pub source: String,

    #[serde(default)]
    pub reason: String,

    /// RFC 3339 timestamp from the detector; may be malformed, in which case
    /// the task simply earns no age bonus when scored
    #[serde(default)]
    pub detected_at: String,

    #[serde(default)]
    pub gap_size: Option<i64>,

    #[serde(default)]
    pub success_rate: Option<f64>,

    #[serde(default = "default_estimated_time_minutes")]
    pub estimated_time_minutes: f64,

    /// Scraper parameters (season, ids, date range, ...)
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl Task {
    /// Parse the detection timestamp, if it is well-formed
    pub fn detected_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.detected_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Wall-clock budget for the scraper process
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64((self.estimated_time_minutes * 60.0).max(1.0))
    }
}

/// Per-tier counts from the queue file header
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Deserialize)]
struct RawQueue {
    #[serde(default)]
    total_tasks: usize,
    #[serde(default)]
    by_priority: PriorityCounts,
    #[serde(default)]
    tasks: Vec<Value>,
}

/// The loaded task queue: validated tasks plus a count of quarantined entries
#[derive(Debug, Clone)]
pub struct TaskQueue {
    pub total_tasks: usize,
    pub by_priority: PriorityCounts,
    pub tasks: Vec<Task>,
    pub quarantined: usize,
}

impl TaskQueue {
    /// Load and validate the task queue file.
    ///
    /// A missing or syntactically-broken file is fatal; an individual entry
    /// that does not deserialize (or lacks id/scraper/source) is quarantined.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read task queue {}", path.display()))?;
        let raw: RawQueue =
            serde_json::from_str(&content).context(format!("Failed to parse task queue {}", path.display()))?;

        let mut tasks = Vec::with_capacity(raw.tasks.len());
        let mut quarantined = 0;

        for (index, entry) in raw.tasks.into_iter().enumerate() {
            match serde_json::from_value::<Task>(entry) {
                Ok(task) if task.is_well_formed() => tasks.push(task),
                Ok(task) => {
                    warn!(index, id = %task.id, "quarantined task with empty id/scraper/source");
                    quarantined += 1;
                }
                Err(error) => {
                    warn!(index, %error, "quarantined malformed task entry");
                    quarantined += 1;
                }
            }
        }

        if raw.total_tasks != 0 && raw.total_tasks != tasks.len() + quarantined {
            warn!(
                declared = raw.total_tasks,
                parsed = tasks.len(),
                quarantined,
                "task queue header count does not match entries"
            );
        }

        Ok(Self {
            total_tasks: tasks.len(),
            by_priority: raw.by_priority,
            tasks,
            quarantined,
        })
    }
}

impl Task {
    fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.scraper.trim().is_empty() && !self.source.trim().is_empty()
    }
}
