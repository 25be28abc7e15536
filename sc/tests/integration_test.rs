//! Integration tests for the coordinator
//!
//! These run real (tiny) scraper processes against the orchestrator and
//! verify dispatch policy, containment, and rate-limit behavior end to end.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use serial_test::serial;
use tempfile::TempDir;

use scrapecoord::config::Config;
use scrapecoord::domain::{Priority, ScraperEntry, ScraperRegistry, Task, TaskQueue};
use scrapecoord::orchestrator::{Orchestrator, RunOptions};
use scrapecoord::ratelimit::SourceLimits;

// =============================================================================
// Helpers
// =============================================================================

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn registry(entries: Vec<(&str, PathBuf, Vec<&str>)>) -> ScraperRegistry {
    ScraperRegistry {
        scrapers: entries
            .into_iter()
            .map(|(name, script, accepted)| {
                (
                    name.to_string(),
                    ScraperEntry {
                        script,
                        accepted_parameters: accepted.into_iter().map(String::from).collect(),
                    },
                )
            })
            .collect(),
    }
}

fn task(id: &str, priority: Priority, scraper: &str, source: &str) -> Task {
    Task {
        id: id.to_string(),
        priority,
        scraper: scraper.to_string(),
        source: source.to_string(),
        reason: String::new(),
        detected_at: String::new(),
        gap_size: None,
        success_rate: None,
        estimated_time_minutes: 1.0,
        params: HashMap::new(),
    }
}

fn with_params(mut t: Task, params: Vec<(&str, Value)>) -> Task {
    t.params = params.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    t
}

fn queue(tasks: Vec<Task>) -> TaskQueue {
    TaskQueue {
        total_tasks: tasks.len(),
        by_priority: Default::default(),
        tasks,
        quarantined: 0,
    }
}

fn unlimited_config() -> Config {
    let mut config = Config::default();
    config.rate_limiting.enabled = false;
    config
}

// =============================================================================
// Containment and classification
// =============================================================================

#[tokio::test]
async fn test_dry_run_skips_every_task() {
    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        ScraperRegistry::default(),
        RunOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    let report = orchestrator
        .run(queue(vec![
            task("a", Priority::Critical, "missing_scraper", "src"),
            task("b", Priority::High, "another_missing", "src"),
            task("c", Priority::Low, "third", "src"),
        ]))
        .await;

    // no scripts exist, so anything other than a skip would have failed
    assert_eq!(report.execution.skipped, 3);
    assert_eq!(report.execution.completed, 0);
    assert_eq!(report.execution.failed, 0);
    assert!(report.clean());
}

#[tokio::test]
async fn test_unknown_scraper_fails_only_that_task() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("collector", ok, vec![])]),
        RunOptions::default(),
    );

    let report = orchestrator
        .run(queue(vec![
            task("good", Priority::High, "collector", "src"),
            task("bad", Priority::High, "ghost", "src"),
        ]))
        .await;

    assert_eq!(report.execution.completed, 1);
    assert_eq!(report.execution.failed, 1);
    assert!(!report.clean());
    assert_eq!(report.execution.by_scraper.get("ghost").unwrap().failed, 1);
}

#[tokio::test]
async fn test_batch_completes_across_tiers() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("collector", ok, vec![])]),
        RunOptions::default(),
    );

    let report = orchestrator
        .run(queue(vec![
            task("c1", Priority::Critical, "collector", "src"),
            task("h1", Priority::High, "collector", "src"),
            task("m1", Priority::Medium, "collector", "src"),
            task("l1", Priority::Low, "collector", "src"),
        ]))
        .await;

    assert_eq!(report.execution.completed, 4);
    assert_eq!(report.execution.failed, 0);
    for tier in Priority::dispatch_order() {
        assert_eq!(report.execution.by_tier.get(&tier).unwrap().completed, 1);
    }
}

#[tokio::test]
async fn test_failing_scraper_is_contained() {
    let dir = TempDir::new().unwrap();
    let fail = write_script(dir.path(), "fail.sh", "echo kaboom >&2; exit 2");
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("broken", fail, vec![]), ("collector", ok, vec![])]),
        RunOptions::default(),
    );

    let report = orchestrator
        .run(queue(vec![
            task("a", Priority::High, "broken", "src"),
            task("b", Priority::High, "collector", "src"),
        ]))
        .await;

    assert_eq!(report.execution.completed, 1);
    assert_eq!(report.execution.failed, 1);
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    let slow = write_script(dir.path(), "slow.sh", "sleep 30");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("sleeper", slow, vec![])]),
        RunOptions::default(),
    );

    let mut t = task("t", Priority::High, "sleeper", "src");
    t.estimated_time_minutes = 0.005; // 0.3s budget, floored to 1s

    let start = Instant::now();
    let report = orchestrator.run(queue(vec![t])).await;

    assert_eq!(report.execution.failed, 1);
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
async fn test_priority_filter_selects_one_tier() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("collector", ok, vec![])]),
        RunOptions {
            priority: Some(Priority::High),
            ..Default::default()
        },
    );

    let report = orchestrator
        .run(queue(vec![
            task("h1", Priority::High, "collector", "src"),
            task("l1", Priority::Low, "collector", "src"),
            task("l2", Priority::Low, "collector", "src"),
        ]))
        .await;

    assert_eq!(report.execution.total, 1);
    assert_eq!(report.execution.completed, 1);
}

// =============================================================================
// Dispatch ordering
// =============================================================================

/// Scrapers append their `id` parameter to a shared file; with a single
/// worker the file records execution order, which equals submission order.
fn order_setup(dir: &Path) -> (ScraperRegistry, PathBuf) {
    let script = write_script(dir, "order.sh", "echo \"$4\" >> \"$2\"");
    let out = dir.join("order.txt");
    (registry(vec![("recorder", script, vec!["out", "id"])]), out)
}

fn order_task(id: &str, priority: Priority, out: &Path) -> Task {
    with_params(
        task(id, priority, "recorder", "src"),
        vec![
            ("out", json!(out.to_string_lossy())),
            ("id", json!(id)),
        ],
    )
}

#[tokio::test]
async fn test_tiered_dispatch_submits_higher_tiers_first() {
    let dir = TempDir::new().unwrap();
    let (registry, out) = order_setup(dir.path());

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry,
        RunOptions {
            max_concurrent: 1,
            ..Default::default()
        },
    );

    let report = orchestrator
        .run(queue(vec![
            order_task("l1", Priority::Low, &out),
            order_task("c1", Priority::Critical, &out),
            order_task("h1", Priority::High, &out),
            order_task("m1", Priority::Medium, &out),
            order_task("c2", Priority::Critical, &out),
        ]))
        .await;
    assert_eq!(report.execution.completed, 5);

    let recorded = fs::read_to_string(&out).unwrap();
    let order: Vec<&str> = recorded.lines().collect();
    assert_eq!(order, vec!["c1", "c2", "h1", "m1", "l1"]);
}

#[tokio::test]
async fn test_weighted_dispatch_follows_descending_score() {
    let dir = TempDir::new().unwrap();
    let (registry, out) = order_setup(dir.path());

    let mut config = unlimited_config();
    config.task_processing.priority_weighting.enabled = true;

    let orchestrator = Orchestrator::new(
        &config,
        registry,
        RunOptions {
            max_concurrent: 1,
            ..Default::default()
        },
    );

    let report = orchestrator
        .run(queue(vec![
            order_task("low", Priority::Low, &out),
            order_task("crit", Priority::Critical, &out),
            order_task("med", Priority::Medium, &out),
        ]))
        .await;
    assert_eq!(report.execution.completed, 3);

    let recorded = fs::read_to_string(&out).unwrap();
    let order: Vec<&str> = recorded.lines().collect();
    assert_eq!(order, vec!["crit", "med", "low"]);
}

// =============================================================================
// Rate limiting and shutdown
// =============================================================================

#[tokio::test]
#[serial]
async fn test_token_bucket_paces_same_source_tasks() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let mut config = Config::default();
    config.rate_limiting.source_limits.insert(
        "nba.com".to_string(),
        SourceLimits {
            requests_per_minute: 60, // one token per second
            requests_per_hour: 10_000,
            burst_size: 1,
            min_delay_seconds: 0.0,
        },
    );

    let orchestrator = Orchestrator::new(
        &config,
        registry(vec![("collector", ok, vec![])]),
        RunOptions {
            max_concurrent: 3,
            ..Default::default()
        },
    );

    let start = Instant::now();
    let report = orchestrator
        .run(queue(vec![
            task("a", Priority::High, "collector", "nba.com"),
            task("b", Priority::High, "collector", "nba.com"),
            task("c", Priority::High, "collector", "nba.com"),
        ]))
        .await;

    // one immediate burst token, then roughly one admission per second
    assert_eq!(report.execution.completed, 3);
    assert_eq!(report.execution.failed, 0);
    assert!(start.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test]
#[serial]
async fn test_throttled_sources_can_be_skipped_at_dispatch() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(dir.path(), "ok.sh", "exit 0");

    let mut config = Config::default();
    config.task_processing.skip_when_throttled = true;
    config.rate_limiting.source_limits.insert(
        "slow.example".to_string(),
        SourceLimits {
            requests_per_minute: 6, // refills far slower than the test runs
            requests_per_hour: 10_000,
            burst_size: 1,
            min_delay_seconds: 0.0,
        },
    );

    let orchestrator = Orchestrator::new(
        &config,
        registry(vec![("collector", ok, vec![])]),
        RunOptions {
            max_concurrent: 1,
            skip_when_throttled: true,
            ..Default::default()
        },
    );

    let start = Instant::now();
    let report = orchestrator
        .run(queue(vec![
            task("a", Priority::High, "collector", "slow.example"),
            task("b", Priority::High, "collector", "slow.example"),
            task("c", Priority::High, "collector", "slow.example"),
        ]))
        .await;

    // only the burst token's task ran; the rest were declined, not queued
    assert_eq!(report.execution.completed, 1);
    assert_eq!(report.execution.skipped, 2);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
#[serial]
async fn test_interrupt_halts_dispatch_but_not_inflight_tasks() {
    let dir = TempDir::new().unwrap();
    let slow = write_script(dir.path(), "slow.sh", "sleep 1");

    let orchestrator = Orchestrator::new(
        &unlimited_config(),
        registry(vec![("sleeper", slow, vec![])]),
        RunOptions {
            max_concurrent: 2,
            ..Default::default()
        },
    );

    let stop = orchestrator.stop_flag();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.store(true, Ordering::SeqCst);
    });

    let report = orchestrator
        .run(queue(vec![
            task("a", Priority::High, "sleeper", "src"),
            task("b", Priority::High, "sleeper", "src"),
            task("c", Priority::High, "sleeper", "src"),
            task("d", Priority::High, "sleeper", "src"),
            task("e", Priority::High, "sleeper", "src"),
        ]))
        .await;

    // the two in-flight tasks finished; the rest were never dispatched and
    // are intentionally left unclassified
    assert_eq!(report.execution.completed, 2);
    assert_eq!(report.execution.failed, 0);
    assert_eq!(report.execution.skipped, 0);
    assert_eq!(report.execution.total, 5);
}
