//! Sync run entity
//!
//! A [`SyncRun`] is one end-to-end synchronization attempt. It is created at
//! orchestration start, accumulates counts and errors as batches complete,
//! and is finalized exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Gamekey, SyncRunId};

/// Outcome of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not finalized yet
    Running,
    /// Every attempted batch succeeded (or there was nothing to fetch)
    Success,
    /// Some batches failed, at least one succeeded, or the run was cancelled
    Partial,
    /// No batch succeeded, or no session could be established
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// One entry of the per-run error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Batch ordinal, or `None` for run-level errors
    pub batch: Option<usize>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One end-to-end synchronization attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    id: SyncRunId,
    forced: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: SyncStatus,
    skipped_reason: Option<String>,
    cancelled: bool,
    gamekeys_discovered: u64,
    batches_total: u64,
    batches_succeeded: u64,
    batches_failed: u64,
    bundles_processed: u64,
    items_processed: u64,
    downloads_processed: u64,
    items_failed: u64,
    failed_gamekeys: Vec<Gamekey>,
    errors: Vec<RunError>,
}

impl SyncRun {
    /// Starts a new run
    pub fn start(forced: bool) -> Self {
        Self {
            id: SyncRunId::new(),
            forced,
            started_at: Utc::now(),
            finished_at: None,
            status: SyncStatus::Running,
            skipped_reason: None,
            cancelled: false,
            gamekeys_discovered: 0,
            batches_total: 0,
            batches_succeeded: 0,
            batches_failed: 0,
            bundles_processed: 0,
            items_processed: 0,
            downloads_processed: 0,
            items_failed: 0,
            failed_gamekeys: Vec::new(),
            errors: Vec::new(),
        }
    }

    // --- accessors ---

    pub fn id(&self) -> SyncRunId {
        self.id
    }

    pub fn forced(&self) -> bool {
        self.forced
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Reason the run was skipped without contacting the remote service
    pub fn skipped_reason(&self) -> Option<&str> {
        self.skipped_reason.as_deref()
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn gamekeys_discovered(&self) -> u64 {
        self.gamekeys_discovered
    }

    pub fn batches_total(&self) -> u64 {
        self.batches_total
    }

    pub fn batches_succeeded(&self) -> u64 {
        self.batches_succeeded
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed
    }

    pub fn bundles_processed(&self) -> u64 {
        self.bundles_processed
    }

    /// Products stored successfully
    pub fn items_processed(&self) -> u64 {
        self.items_processed
    }

    pub fn downloads_processed(&self) -> u64 {
        self.downloads_processed
    }

    /// Records that failed to parse or store
    pub fn items_failed(&self) -> u64 {
        self.items_failed
    }

    /// Gamekeys of every batch that failed or was never attempted, for a
    /// follow-up forced run
    pub fn failed_gamekeys(&self) -> &[Gamekey] {
        &self.failed_gamekeys
    }

    pub fn errors(&self) -> &[RunError] {
        &self.errors
    }

    // --- mutation (counts only ever grow) ---

    pub fn set_discovered(&mut self, discovered: usize, batches: usize) {
        self.gamekeys_discovered = discovered as u64;
        self.batches_total = batches as u64;
    }

    pub fn record_batch_success(&mut self) {
        self.batches_succeeded += 1;
    }

    pub fn record_batch_failure(&mut self, batch: usize, gamekeys: &[Gamekey], message: String) {
        self.batches_failed += 1;
        self.failed_gamekeys.extend_from_slice(gamekeys);
        self.record_error(Some(batch), message);
    }

    /// Lists gamekeys the run stopped before fetching
    ///
    /// Batch counts are untouched; only attempted batches count as failed.
    pub fn record_unattempted(&mut self, gamekeys: &[Gamekey]) {
        self.failed_gamekeys.extend_from_slice(gamekeys);
    }

    pub fn record_bundle(&mut self) {
        self.bundles_processed += 1;
    }

    pub fn record_item(&mut self) {
        self.items_processed += 1;
    }

    pub fn record_download(&mut self) {
        self.downloads_processed += 1;
    }

    pub fn record_item_failure(&mut self, batch: Option<usize>, message: String) {
        self.items_failed += 1;
        self.record_error(batch, message);
    }

    pub fn record_error(&mut self, batch: Option<usize>, message: String) {
        self.errors.push(RunError {
            batch,
            message,
            at: Utc::now(),
        });
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    // --- finalization ---

    /// Finalizes a run that was skipped by the minimum-interval policy
    pub fn finish_skipped(&mut self, reason: impl Into<String>) {
        self.skipped_reason = Some(reason.into());
        self.finish(SyncStatus::Success);
    }

    /// Finalizes a run that could not proceed at all
    pub fn finish_failed(&mut self, message: String) {
        self.record_error(None, message);
        self.finish(SyncStatus::Failed);
    }

    /// Finalizes a run from its batch counts
    ///
    /// `aborted` marks an early termination (lost session); cancelled runs
    /// are always partial.
    pub fn finish_from_counts(&mut self, aborted: bool) {
        let status = if self.cancelled {
            SyncStatus::Partial
        } else if aborted {
            if self.batches_succeeded > 0 {
                SyncStatus::Partial
            } else {
                SyncStatus::Failed
            }
        } else if self.batches_failed == 0 {
            SyncStatus::Success
        } else if self.batches_succeeded > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        };
        self.finish(status);
    }

    fn finish(&mut self, status: SyncStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Rebuilds a run from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SyncRunId,
        forced: bool,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        status: SyncStatus,
        counts: RunCounts,
        failed_gamekeys: Vec<Gamekey>,
        errors: Vec<RunError>,
    ) -> Self {
        Self {
            id,
            forced,
            started_at,
            finished_at,
            status,
            skipped_reason: None,
            cancelled: counts.cancelled,
            gamekeys_discovered: counts.gamekeys_discovered,
            batches_total: counts.batches_total,
            batches_succeeded: counts.batches_succeeded,
            batches_failed: counts.batches_failed,
            bundles_processed: counts.bundles_processed,
            items_processed: counts.items_processed,
            downloads_processed: counts.downloads_processed,
            items_failed: counts.items_failed,
            failed_gamekeys,
            errors,
        }
    }

    /// Snapshot of the counters, for persistence
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            cancelled: self.cancelled,
            gamekeys_discovered: self.gamekeys_discovered,
            batches_total: self.batches_total,
            batches_succeeded: self.batches_succeeded,
            batches_failed: self.batches_failed,
            bundles_processed: self.bundles_processed,
            items_processed: self.items_processed,
            downloads_processed: self.downloads_processed,
            items_failed: self.items_failed,
        }
    }
}

/// Flat counter set used when persisting and restoring a [`SyncRun`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub cancelled: bool,
    pub gamekeys_discovered: u64,
    pub batches_total: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub bundles_processed: u64,
    pub items_processed: u64,
    pub downloads_processed: u64,
    pub items_failed: u64,
}
