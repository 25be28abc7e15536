//! scrapecoord - CLI entry point
//!
//! Loads the task queue and scraper registry, runs the batch, prints the
//! summary, and triggers reconciliation. Exit code 0 only when loading
//! succeeded and no task failed.

use std::sync::atomic::Ordering;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use scrapecoord::cli::{Cli, OutputFormat};
use scrapecoord::config::Config;
use scrapecoord::domain::{ScraperRegistry, TaskQueue};
use scrapecoord::orchestrator::{Orchestrator, RunOptions};
use scrapecoord::reconcile;

fn setup_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    // Both inputs are fatal when missing or malformed, before any dispatch.
    let queue = TaskQueue::load(&cli.task_queue).context("Failed to load task queue")?;
    let registry = ScraperRegistry::load(&cli.scraper_config).context("Failed to load scraper registry")?;

    info!(
        tasks = queue.tasks.len(),
        quarantined = queue.quarantined,
        scrapers = registry.len(),
        "loaded inputs"
    );

    let options = RunOptions {
        dry_run: cli.dry_run,
        priority: cli.priority,
        max_concurrent: cli.max_concurrent.unwrap_or(config.task_processing.max_concurrent),
        skip_when_throttled: config.task_processing.skip_when_throttled,
    };

    let orchestrator = Orchestrator::new(&config, registry, options);

    let stop = orchestrator.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight tasks");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let report = orchestrator.run(queue).await;

    match cli.format {
        OutputFormat::Text => {
            print!("{report}");
            if report.clean() {
                println!("{}", "run completed with no failures".green());
            } else {
                println!("{}", format!("{} task(s) failed", report.execution.failed).red().bold());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if cli.no_reconciliation {
        info!("reconciliation suppressed");
    } else if let Err(error) = reconcile::trigger(&config.reconciliation, cli.dry_run).await {
        warn!(%error, "reconciliation trigger failed");
    }

    if !report.clean() {
        std::process::exit(1);
    }
    Ok(())
}
