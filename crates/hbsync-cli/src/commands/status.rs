//! Status command - Display the local library and the last sync
//!
//! Provides the `hbsync status` CLI command which shows:
//! 1. Session state (from metadata only)
//! 2. The most recent sync run and its outcome
//! 3. Stored bundle, product and download totals with per-category counts

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use hbsync_core::domain::SessionStatus;
use hbsync_core::ports::ISessionStore;

use crate::commands::sync::run_to_json;
use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

/// Show library and sync status
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);

        let session = ctx
            .session_store()
            .inspect()
            .await
            .context("Failed to read session metadata")?;
        let session_status = session
            .as_ref()
            .map_or(SessionStatus::None, |s| s.status(Utc::now()));

        let db_path = ctx.config.storage.database_path();
        if !db_path.exists() {
            if format.is_json() {
                fmt.print_json(&serde_json::json!({
                    "session": session_status,
                    "last_run": null,
                    "library": null,
                }));
            } else {
                fmt.info(&format!("Session: {session_status}"));
                fmt.info("No library database yet. Run 'hbsync sync' first.");
            }
            return Ok(());
        }

        let repository = ctx.open_repository().await?;
        let last_run = repository
            .latest_run()
            .await
            .context("Failed to query sync runs")?;
        let summary = repository
            .library_summary()
            .await
            .context("Failed to query library totals")?;

        if format.is_json() {
            fmt.print_json(&serde_json::json!({
                "session": session_status,
                "last_run": last_run.as_ref().map(run_to_json),
                "library": summary,
            }));
            return Ok(());
        }

        fmt.info(&format!("Session: {session_status}"));
        match &last_run {
            Some(run) => {
                let finished = run
                    .finished_at()
                    .map_or_else(|| "unfinished".to_string(), |at| at.to_string());
                fmt.info(&format!("Last sync: {} ({finished})", run.status()));
                if !run.failed_gamekeys().is_empty() {
                    fmt.info(&format!(
                        "  {} left unfetched",
                        plural(run.failed_gamekeys().len() as u64, "order", "orders")
                    ));
                }
            }
            None => fmt.info("Last sync: never"),
        }

        fmt.info(&format!(
            "Library: {}, {}, {}",
            plural(summary.bundles, "bundle", "bundles"),
            plural(summary.products, "product", "products"),
            plural(summary.downloads, "download", "downloads"),
        ));
        for count in &summary.categories {
            fmt.info(&format!("  {:<24} {}", count.category, count.products));
        }
        Ok(())
    }
}
