//! Batch orchestration
//!
//! Owns the worker pool and the dispatch policy. Tiered mode submits one
//! tier at a time and waits for it to drain before the next — a
//! dispatch-time barrier, not preemption, so completion order within a tier
//! stays pool-arbitrary. Weighted mode submits everything in descending
//! score order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::domain::{Priority, ScraperRegistry, Task, TaskQueue};
use crate::ratelimit::{RateLimiter, RateLimiterSnapshot};
use crate::scoring::{self, WeightingConfig};

use super::stats::{ExecutionStats, StatsSnapshot};
use super::worker;

/// Per-run dispatch options, mostly CLI-driven
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub priority: Option<Priority>,
    pub max_concurrent: usize,
    pub skip_when_throttled: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            priority: None,
            max_concurrent: 5,
            skip_when_throttled: false,
        }
    }
}

/// Everything a run produced, for the summary and the exit code
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution: StatsSnapshot,
    pub rate_limiter: RateLimiterSnapshot,
}

impl RunReport {
    /// A clean run has no failed tasks; skipped tasks are retried next run
    pub fn clean(&self) -> bool {
        self.execution.failed == 0
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.execution)?;
        writeln!(f)?;
        write!(f, "{}", self.rate_limiter)
    }
}

/// Executes a batch of tasks against a bounded worker pool, honoring the
/// rate limiter and the priority policy.
pub struct Orchestrator {
    registry: Arc<ScraperRegistry>,
    limiter: Arc<RateLimiter>,
    weighting: WeightingConfig,
    options: RunOptions,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: &Config, registry: ScraperRegistry, options: RunOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            limiter: Arc::new(RateLimiter::new(config.rate_limiting.clone())),
            weighting: config.task_processing.priority_weighting.clone(),
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared stop flag. Setting it halts dispatch of not-yet-submitted
    /// tasks; in-flight tasks run to completion.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub async fn run(&self, queue: TaskQueue) -> RunReport {
        let mut tasks = queue.tasks;
        if let Some(tier) = self.options.priority {
            tasks.retain(|t| t.priority == tier);
            info!(%tier, selected = tasks.len(), "filtered to one priority tier");
        }

        let stats = Arc::new(ExecutionStats::new(tasks.len(), queue.quarantined));
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));

        if self.weighting.enabled {
            self.run_weighted(tasks, &semaphore, &stats).await;
        } else {
            self.run_tiered(tasks, &semaphore, &stats).await;
        }

        stats.finish().await;
        RunReport {
            execution: stats.snapshot().await,
            rate_limiter: self.limiter.snapshot().await,
        }
    }

    /// Score every task, then submit in descending score order.
    async fn run_weighted(&self, tasks: Vec<Task>, semaphore: &Arc<Semaphore>, stats: &Arc<ExecutionStats>) {
        let now = Utc::now();
        let mut scored: Vec<(Task, f64)> = tasks
            .into_iter()
            .map(|task| {
                let score = scoring::score(&task, &self.weighting, now);
                (task, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        info!(tasks = scored.len(), "dispatching by weighted score");

        let mut pool = JoinSet::new();
        for (task, score) in scored {
            debug!(task = %task.id, score, "submitting");
            if !self.submit(&mut pool, semaphore, task, stats).await {
                break;
            }
        }
        drain(&mut pool, stats).await;
    }

    /// Submit tier by tier, draining each before the next begins.
    async fn run_tiered(&self, mut tasks: Vec<Task>, semaphore: &Arc<Semaphore>, stats: &Arc<ExecutionStats>) {
        for tier in Priority::dispatch_order() {
            let (batch, rest): (Vec<Task>, Vec<Task>) = tasks.into_iter().partition(|t| t.priority == tier);
            tasks = rest;
            if batch.is_empty() {
                continue;
            }
            info!(%tier, tasks = batch.len(), "dispatching tier");

            let mut pool = JoinSet::new();
            let mut halted = false;
            for task in batch {
                if !self.submit(&mut pool, semaphore, task, stats).await {
                    halted = true;
                    break;
                }
            }
            drain(&mut pool, stats).await;
            if halted {
                return;
            }
        }
    }

    /// Submit one task to the pool. Returns false once the stop flag is set,
    /// which halts all further dispatch.
    async fn submit(
        &self,
        pool: &mut JoinSet<()>,
        semaphore: &Arc<Semaphore>,
        task: Task,
        stats: &Arc<ExecutionStats>,
    ) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            info!("stop requested, halting dispatch");
            return false;
        }

        // Waiting for a pool slot here keeps submission order exact and lets
        // the stop flag take effect between submissions.
        let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
            return false;
        };
        if self.stop.load(Ordering::SeqCst) {
            info!("stop requested, halting dispatch");
            return false;
        }

        let preacquired = if self.options.skip_when_throttled && !self.options.dry_run {
            if self.limiter.try_acquire(&task.source).await {
                true
            } else {
                debug!(task = %task.id, source = %task.source, "source throttled, skipping");
                stats.record_skipped(&task).await;
                return true;
            }
        } else {
            false
        };

        debug!(task = %task.id, tier = %task.priority, "dispatched");
        let registry = Arc::clone(&self.registry);
        let limiter = Arc::clone(&self.limiter);
        let stats = Arc::clone(stats);
        let dry_run = self.options.dry_run;
        pool.spawn(async move {
            let _permit = permit;
            worker::run_task(task, registry, limiter, stats, dry_run, preacquired).await;
        });
        true
    }
}

async fn drain(pool: &mut JoinSet<()>, stats: &Arc<ExecutionStats>) {
    while let Some(joined) = pool.join_next().await {
        if let Err(error) = joined {
            // The worker died without recording its task; count it so the
            // exit code reflects the fault.
            error!(%error, "worker aborted");
            stats.record_fault().await;
        }
    }
}
