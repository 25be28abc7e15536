//! scrapecoord - scheduling and rate-limit admission control for scraper runs
//!
//! The upstream gap detector emits a queue of collection tasks; this crate
//! executes them against a bounded worker pool without ever exceeding the
//! configured per-source and global rate limits.
//!
//! # Core Concepts
//!
//! - **Admission control**: every outbound call passes through one shared
//!   [`ratelimit::RateLimiter`] combining sliding windows, a token bucket,
//!   minimum spacing, and failure backoff
//! - **Priority policy**: strict tier-by-tier dispatch, or continuous
//!   weighted scoring when enabled
//! - **Containment**: a failing task is recorded and never aborts the batch;
//!   only load-time errors are fatal
//!
//! # Modules
//!
//! - [`domain`] - tasks, priority tiers, and the scraper registry
//! - [`ratelimit`] - per-source and global admission control
//! - [`scoring`] - weighted task scoring
//! - [`orchestrator`] - worker pool, dispatch policy, statistics
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod ratelimit;
pub mod reconcile;
pub mod scoring;

// Re-export commonly used types
pub use cli::{Cli, OutputFormat};
pub use config::{Config, ReconciliationConfig, TaskProcessingConfig};
pub use domain::{Priority, ScraperEntry, ScraperRegistry, Task, TaskQueue};
pub use error::TaskError;
pub use orchestrator::{ExecutionStats, Orchestrator, RunOptions, RunReport, StatsSnapshot};
pub use ratelimit::{RateLimitConfig, RateLimiter, RateLimiterSnapshot};
pub use scoring::{WeightingConfig, score};
