//! Batch orchestration: worker pool, dispatch policy, shared statistics

mod engine;
mod stats;
mod worker;

pub use engine::{Orchestrator, RunOptions, RunReport};
pub use stats::{ExecutionStats, OutcomeCounts, StatsSnapshot};
pub use worker::build_invocation;
