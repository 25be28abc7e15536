//! Domain types: tasks, priority tiers, and the scraper registry
//!
//! Everything here is loaded once per run and read-only afterwards.

mod priority;
mod registry;
mod task;

pub use priority::Priority;
pub use registry::{ScraperEntry, ScraperRegistry};
pub use task::{PriorityCounts, Task, TaskQueue};
