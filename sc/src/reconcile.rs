//! Downstream reconciliation trigger
//!
//! After a batch the upstream gap picture is stale; this kicks the external
//! reconciliation process so the next run sees fresh gaps. The trigger's own
//! outcome is logged and never changes the batch's exit status.

use std::process::Stdio;
use std::time::Duration;

use eyre::{Result, eyre};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ReconciliationConfig;

pub async fn trigger(config: &ReconciliationConfig, preview: bool) -> Result<()> {
    let Some(command) = &config.command else {
        debug!("no reconciliation command configured");
        return Ok(());
    };

    let mut cmd = Command::new(command);
    cmd.args(&config.args);
    if preview {
        cmd.arg("--preview");
    }
    // Reconciliation logs on its own; only the exit status matters here.
    cmd.stdin(Stdio::null());

    info!(%command, preview, "triggering reconciliation");
    let timeout = Duration::from_secs(config.timeout_seconds.max(1));
    let status = tokio::time::timeout(timeout, cmd.status())
        .await
        .map_err(|_| eyre!("reconciliation timed out after {}s", timeout.as_secs()))?
        .map_err(|e| eyre!("failed to run reconciliation command {command}: {e}"))?;

    if status.success() {
        info!("reconciliation triggered");
        Ok(())
    } else {
        Err(eyre!("reconciliation exited with status {:?}", status.code()))
    }
}
