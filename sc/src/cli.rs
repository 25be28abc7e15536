//! CLI definition

use clap::Parser;
use std::path::PathBuf;

use crate::domain::Priority;

/// Scraper run coordinator
#[derive(Parser)]
#[command(
    name = "sc",
    about = "Schedules scraper runs against rate-limited sources",
    version
)]
pub struct Cli {
    /// Task queue file produced by the gap detector
    #[arg(long, value_name = "PATH")]
    pub task_queue: PathBuf,

    /// Scraper registry file
    #[arg(long, value_name = "PATH")]
    pub scraper_config: PathBuf,

    /// Path to coordinator config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only process tasks of this tier
    #[arg(long, value_name = "TIER")]
    pub priority: Option<Priority>,

    /// Worker pool width (overrides config)
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Classify every selected task as skipped without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not trigger reconciliation after the batch
    #[arg(long)]
    pub no_reconciliation: bool,

    /// Summary output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Output format for the end-of-run summary
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec!["sc", "--task-queue", "queue.json", "--scraper-config", "scrapers.yml"]
    }

    #[test]
    fn test_cli_parse_minimal() {
        let cli = Cli::parse_from(base_args());
        assert_eq!(cli.task_queue, PathBuf::from("queue.json"));
        assert_eq!(cli.scraper_config, PathBuf::from("scrapers.yml"));
        assert!(cli.priority.is_none());
        assert!(!cli.dry_run);
        assert!(!cli.no_reconciliation);
    }

    #[test]
    fn test_cli_requires_task_queue() {
        let result = Cli::try_parse_from(["sc", "--scraper-config", "s.yml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_priority() {
        let mut args = base_args();
        args.extend(["--priority", "critical"]);
        let cli = Cli::parse_from(args);
        assert_eq!(cli.priority, Some(Priority::Critical));
    }

    #[test]
    fn test_cli_parse_flags() {
        let mut args = base_args();
        args.extend(["--dry-run", "--no-reconciliation", "--max-concurrent", "3"]);
        let cli = Cli::parse_from(args);
        assert!(cli.dry_run);
        assert!(cli.no_reconciliation);
        assert_eq!(cli.max_concurrent, Some(3));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
