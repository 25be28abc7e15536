//! Shared execution statistics
//!
//! One instance per run, shared by reference with every worker. Counters are
//! mutated under a single mutex that is never held across an await of
//! anything slower than the lock itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::{Priority, Task};

/// Completed/failed counters, kept per tier and per scraper
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutcomeCounts {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
struct StatsInner {
    total: usize,
    completed: u64,
    failed: u64,
    skipped: u64,
    quarantined: usize,
    by_tier: BTreeMap<Priority, OutcomeCounts>,
    by_scraper: BTreeMap<String, OutcomeCounts>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Mutable batch counters behind a mutex
pub struct ExecutionStats {
    inner: Mutex<StatsInner>,
}

impl ExecutionStats {
    pub fn new(total: usize, quarantined: usize) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                total,
                completed: 0,
                failed: 0,
                skipped: 0,
                quarantined,
                by_tier: BTreeMap::new(),
                by_scraper: BTreeMap::new(),
                started_at: Utc::now(),
                finished_at: None,
            }),
        }
    }

    pub async fn record_completed(&self, task: &Task) {
        let mut inner = self.inner.lock().await;
        inner.completed += 1;
        inner.by_tier.entry(task.priority).or_default().completed += 1;
        inner.by_scraper.entry(task.scraper.clone()).or_default().completed += 1;
    }

    /// Timeouts are failures too; the distinction lives in the task log.
    pub async fn record_failed(&self, task: &Task) {
        let mut inner = self.inner.lock().await;
        inner.failed += 1;
        inner.by_tier.entry(task.priority).or_default().failed += 1;
        inner.by_scraper.entry(task.scraper.clone()).or_default().failed += 1;
    }

    pub async fn record_skipped(&self, _task: &Task) {
        let mut inner = self.inner.lock().await;
        inner.skipped += 1;
    }

    /// A worker died without recording its task (should not happen); counted
    /// against the batch total so the exit code reflects it.
    pub async fn record_fault(&self) {
        let mut inner = self.inner.lock().await;
        inner.failed += 1;
    }

    pub async fn finish(&self) {
        let mut inner = self.inner.lock().await;
        inner.finished_at = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().await;
        StatsSnapshot {
            total: inner.total,
            completed: inner.completed,
            failed: inner.failed,
            skipped: inner.skipped,
            quarantined: inner.quarantined,
            by_tier: inner.by_tier.clone(),
            by_scraper: inner.by_scraper.clone(),
            started_at: inner.started_at,
            finished_at: inner.finished_at,
        }
    }
}

/// Immutable view of the counters, read once after the batch drains
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub quarantined: usize,
    pub by_tier: BTreeMap<Priority, OutcomeCounts>,
    pub by_scraper: BTreeMap<String, OutcomeCounts>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Batch Complete ===")?;
        writeln!(f, "Total tasks:  {}", self.total)?;
        writeln!(f, "Completed:    {}", self.completed)?;
        writeln!(f, "Failed:       {}", self.failed)?;
        writeln!(f, "Skipped:      {}", self.skipped)?;
        if self.quarantined > 0 {
            writeln!(f, "Quarantined:  {}", self.quarantined)?;
        }
        if let Some(secs) = self.duration_seconds() {
            writeln!(f, "Duration:     {:.1}s", secs)?;
        }
        if !self.by_tier.is_empty() {
            writeln!(f, "\nBy tier:")?;
            for tier in Priority::dispatch_order() {
                if let Some(counts) = self.by_tier.get(&tier) {
                    writeln!(f, "  {:<10}{} completed, {} failed", tier, counts.completed, counts.failed)?;
                }
            }
        }
        if !self.by_scraper.is_empty() {
            writeln!(f, "\nBy scraper:")?;
            for (scraper, counts) in &self.by_scraper {
                writeln!(f, "  {:<24}{} completed, {} failed", scraper, counts.completed, counts.failed)?;
            }
        }
        Ok(())
    }
}
