//! Sync command - Pull the purchase library into the local database
//!
//! Provides the `hbsync sync` CLI command which:
//! 1. Skips the run when the last successful sync is recent (unless `--force`)
//! 2. Establishes a session, logging in when necessary
//! 3. Fetches orders in rate-limited batches and stores the records
//! 4. Prints a summary and exits non-zero when the run failed
//!
//! Ctrl-C stops the run at the next batch boundary; the partial result is
//! still recorded.

use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hbsync_core::domain::{SyncRun, SyncStatus};

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

/// Synchronize the library
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Ignore the minimum interval between syncs
    #[arg(long)]
    pub force: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current batch");
                ctrl_c.cancel();
            }
        });

        let mut orchestrator = ctx.orchestrator(cancel).await?;
        fmt.info("Synchronizing library...");
        let run = orchestrator.run(self.force).await;

        if format.is_json() {
            fmt.print_json(&run_to_json(&run));
        } else {
            print_summary(&run, &*fmt);
        }

        if run.status() == SyncStatus::Failed {
            bail!("Sync failed");
        }
        Ok(())
    }
}

/// JSON view of a run, shared with `hbsync status`
pub fn run_to_json(run: &SyncRun) -> Value {
    serde_json::json!({
        "id": run.id().to_string(),
        "status": run.status(),
        "forced": run.forced(),
        "skipped": run.skipped_reason(),
        "started_at": run.started_at(),
        "finished_at": run.finished_at(),
        "counts": run.counts(),
        "failed_gamekeys": run.failed_gamekeys(),
        "errors": run.errors(),
    })
}

fn print_summary(run: &SyncRun, fmt: &dyn OutputFormatter) {
    if let Some(reason) = run.skipped_reason() {
        fmt.success(&format!("Sync skipped: {reason}"));
        fmt.info("Use --force to sync anyway");
        return;
    }

    match run.status() {
        SyncStatus::Success => fmt.success("Sync completed"),
        SyncStatus::Partial if run.was_cancelled() => fmt.warn("Sync cancelled"),
        SyncStatus::Partial => fmt.warn("Sync completed with failures"),
        _ => fmt.error("Sync failed"),
    }

    fmt.info(&format!(
        "{} discovered, {} of {} succeeded",
        plural(run.gamekeys_discovered(), "order", "orders"),
        run.batches_succeeded(),
        plural(run.batches_total(), "batch", "batches"),
    ));
    fmt.info(&format!(
        "{}, {}, {} stored",
        plural(run.bundles_processed(), "bundle", "bundles"),
        plural(run.items_processed(), "product", "products"),
        plural(run.downloads_processed(), "download", "downloads"),
    ));
    if run.items_failed() > 0 {
        fmt.info(&format!(
            "{} could not be stored",
            plural(run.items_failed(), "record", "records")
        ));
    }
    if !run.failed_gamekeys().is_empty() {
        fmt.info(&format!(
            "{} left unfetched",
            plural(run.failed_gamekeys().len() as u64, "order", "orders")
        ));
    }
    for error in run.errors().iter().take(10) {
        match error.batch {
            Some(batch) => fmt.info(&format!("  batch {batch}: {}", error.message)),
            None => fmt.info(&format!("  {}", error.message)),
        }
    }
    if run.errors().len() > 10 {
        fmt.info(&format!("  ... and {} more", run.errors().len() - 10));
    }
}
