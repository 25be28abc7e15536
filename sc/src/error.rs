//! Per-task error types
//!
//! Everything here is contained at the task boundary: a failing task is
//! recorded and the batch continues. Only load-time errors (handled with
//! `eyre` at the call sites) abort a run.

use std::time::Duration;

use thiserror::Error;

/// Ways a single task can fail without affecting its siblings
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("scraper not registered: {name}")]
    UnknownScraper { name: String },

    #[error("failed to run scraper process: {0}")]
    Io(#[from] std::io::Error),

    #[error("scraper timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("scraper exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}
