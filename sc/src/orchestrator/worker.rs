//! Per-task execution on a pool worker
//!
//! A worker resolves the task's scraper, maps whitelisted parameters to
//! arguments, acquires a rate-limit permit, and runs the external process
//! under the task's wall-clock budget. Every outcome is contained here; the
//! permit is returned on every path.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::{ScraperEntry, ScraperRegistry, Task};
use crate::error::TaskError;
use crate::ratelimit::RateLimiter;

use super::stats::ExecutionStats;

/// Retained prefix of a failing scraper's stderr
const STDERR_PREFIX_BYTES: usize = 4096;

/// Grace period between SIGTERM and SIGKILL on timeout
const KILL_GRACE: Duration = Duration::from_secs(5);

pub(crate) async fn run_task(
    task: Task,
    registry: Arc<ScraperRegistry>,
    limiter: Arc<RateLimiter>,
    stats: Arc<ExecutionStats>,
    dry_run: bool,
    preacquired: bool,
) {
    if dry_run {
        debug!(task = %task.id, scraper = %task.scraper, "dry run, skipping");
        stats.record_skipped(&task).await;
        return;
    }

    let Some(entry) = registry.get(&task.scraper).cloned() else {
        let error = TaskError::UnknownScraper {
            name: task.scraper.clone(),
        };
        warn!(task = %task.id, %error, "task failed");
        if preacquired {
            limiter.release(&task.source).await;
        }
        stats.record_failed(&task).await;
        return;
    };

    let args = build_invocation(&task, &entry);

    if !preacquired {
        limiter.acquire(&task.source).await;
    }
    debug!(task = %task.id, scraper = %task.scraper, source = %task.source, "running");

    let result = execute(&entry.script, &args, task.timeout()).await;

    // The permit is returned before the outcome is recorded, on every path.
    limiter.release(&task.source).await;

    match result {
        Ok(()) => {
            debug!(task = %task.id, "completed");
            limiter.record_success(&task.source).await;
            stats.record_completed(&task).await;
        }
        Err(error) => {
            warn!(task = %task.id, scraper = %task.scraper, %error, "task failed");
            limiter.record_failure(&task.source).await;
            stats.record_failed(&task).await;
        }
    }
}

/// Map the parameters the scraper declares it accepts, and only those, from
/// the task's parameter map to `--name value` arguments.
pub fn build_invocation(task: &Task, entry: &ScraperEntry) -> Vec<String> {
    let mut args = Vec::new();
    for name in &entry.accepted_parameters {
        if let Some(value) = task.params.get(name) {
            args.push(format!("--{name}"));
            args.push(render_arg(value));
        }
    }
    args
}

fn render_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_arg).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Run the scraper process under a wall-clock budget.
async fn execute(script: &Path, args: &[String], timeout: Duration) -> Result<(), TaskError> {
    let mut child = Command::new(script)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stderr_reader = tokio::spawn(read_stderr_prefix(child.stderr.take()));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            terminate(&mut child).await;
            stderr_reader.abort();
            return Err(TaskError::Timeout { limit: timeout });
        }
    };

    let stderr_prefix = stderr_reader.await.unwrap_or_default();
    if status.success() {
        Ok(())
    } else {
        Err(TaskError::Failed {
            code: status.code(),
            stderr: stderr_prefix,
        })
    }
}

async fn read_stderr_prefix(stderr: Option<tokio::process::ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut buf = vec![0u8; STDERR_PREFIX_BYTES];
    let mut filled = 0;
    while filled < buf.len() {
        match stderr.read(&mut buf[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    // Keep draining past the prefix so the child never blocks on a full pipe.
    let mut sink = [0u8; 1024];
    loop {
        match stderr.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    buf.truncate(filled);
    String::from_utf8_lossy(&buf).trim_end().to_string()
}

/// SIGTERM first so the scraper can flush partial output, SIGKILL after the
/// grace period.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "scraper ignored SIGTERM, killing");
    }
    let _ = child.kill().await;
}
