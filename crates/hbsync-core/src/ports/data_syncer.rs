//! Storage ports
//!
//! Upserts are idempotent by primary identifier and order-independent, so
//! the orchestrator may forward records in any order and re-run batches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    BundleRecord, Categorization, DownloadRecord, ProductRecord, SyncError, SyncRun,
};

/// Persists library records and finalized runs
#[async_trait]
pub trait IDataSyncer: Send + Sync {
    async fn upsert_bundle(&self, bundle: &BundleRecord) -> Result<(), SyncError>;

    async fn upsert_product(
        &self,
        product: &ProductRecord,
        category: &Categorization,
    ) -> Result<(), SyncError>;

    async fn upsert_download(&self, download: &DownloadRecord) -> Result<(), SyncError>;

    /// Stores a finalized run, including its error log and failed gamekeys
    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), SyncError>;
}

/// Minimum-interval policy consulted before an unforced run
#[async_trait]
pub trait ISyncIntervalPolicy: Send + Sync {
    /// Returns true if enough time has passed since the last recorded run
    async fn is_sync_due(&self, now: DateTime<Utc>) -> Result<bool, SyncError>;
}
