//! SQLite implementation of the storage ports
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                  |
//! |--------------------|----------|-------------------------------------------|
//! | Gamekey            | TEXT     | `.as_str()` / `Gamekey::new()`            |
//! | SyncRunId          | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | DateTime<Utc>      | TEXT     | RFC 3339 via `to_rfc3339()`               |
//! | SyncStatus         | TEXT     | `as_str()` / `FromStr`                    |
//! | u64 counters       | INTEGER  | saturating cast to `i64`                  |
//! | tags               | TEXT     | serde_json array                          |
//! | RunCounts          | TEXT     | serde_json serialization                  |
//! | Gamekey[], RunError[] | TEXT  | serde_json array                          |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hbsync_core::config::SyncConfig;
use hbsync_core::domain::{
    BundleRecord, Categorization, DownloadRecord, Gamekey, ProductRecord, RunCounts, RunError,
    SyncError, SyncRun, SyncRunId, SyncStatus,
};
use hbsync_core::ports::{IDataSyncer, ISyncIntervalPolicy};

use crate::CacheError;

/// Per-category product count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub products: u64,
}

/// Totals shown by `hbsync status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibrarySummary {
    pub bundles: u64,
    pub products: u64,
    pub downloads: u64,
    /// Largest category first
    pub categories: Vec<CategoryCount>,
}

/// SQLite-backed library storage
///
/// Every upsert is idempotent by primary key, so a batch stored twice leaves
/// the same rows behind.
pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn save_bundle(&self, bundle: &BundleRecord) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO bundles (gamekey, name, machine_name, bundle_type, purchased_at,
                                 amount_spent, currency, first_seen_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(gamekey) DO UPDATE SET
                name = excluded.name,
                machine_name = excluded.machine_name,
                bundle_type = excluded.bundle_type,
                purchased_at = excluded.purchased_at,
                amount_spent = excluded.amount_spent,
                currency = excluded.currency,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bundle.gamekey.as_str())
        .bind(&bundle.name)
        .bind(&bundle.machine_name)
        .bind(&bundle.bundle_type)
        .bind(bundle.purchased_at.map(|at| at.to_rfc3339()))
        .bind(bundle.amount_spent)
        .bind(&bundle.currency)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores a product with its category and links it to its bundle
    ///
    /// The bundle must already be stored.
    pub async fn save_product(
        &self,
        product: &ProductRecord,
        categorization: &Categorization,
    ) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();
        let tags = serde_json::to_string(&product.tags)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, machine_name, name, developer, url, icon, is_subscription,
                                  tags, category, subcategory, confidence, first_seen_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                machine_name = excluded.machine_name,
                name = excluded.name,
                developer = excluded.developer,
                url = excluded.url,
                icon = excluded.icon,
                is_subscription = excluded.is_subscription,
                tags = excluded.tags,
                category = excluded.category,
                subcategory = excluded.subcategory,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.machine_name)
        .bind(&product.name)
        .bind(&product.developer)
        .bind(&product.url)
        .bind(&product.icon)
        .bind(product.is_subscription)
        .bind(&tags)
        .bind(&categorization.category)
        .bind(&categorization.subcategory)
        .bind(f64::from(categorization.confidence))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO bundle_products (gamekey, product_id) VALUES (?, ?)")
            .bind(product.gamekey.as_str())
            .bind(&product.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn save_download(&self, download: &DownloadRecord) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO downloads (product_id, platform, name, file_name, size_bytes, md5, sha1,
                                   url, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id, platform, name) DO UPDATE SET
                file_name = excluded.file_name,
                size_bytes = excluded.size_bytes,
                md5 = excluded.md5,
                sha1 = excluded.sha1,
                url = excluded.url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&download.product_id)
        .bind(&download.platform)
        .bind(&download.name)
        .bind(&download.file_name)
        .bind(download.size_bytes.map(to_i64))
        .bind(&download.md5)
        .bind(&download.sha1)
        .bind(&download.url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_run(&self, run: &SyncRun) -> Result<(), CacheError> {
        let counts = serde_json::to_string(&run.counts())?;
        let failed = serde_json::to_string(run.failed_gamekeys())?;
        let errors = serde_json::to_string(run.errors())?;

        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, forced, started_at, finished_at, status, counts,
                                   failed_gamekeys, errors)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                finished_at = excluded.finished_at,
                status = excluded.status,
                counts = excluded.counts,
                failed_gamekeys = excluded.failed_gamekeys,
                errors = excluded.errors
            "#,
        )
        .bind(run.id().to_string())
        .bind(run.forced())
        .bind(run.started_at().to_rfc3339())
        .bind(run.finished_at().map(|at| at.to_rfc3339()))
        .bind(run.status().as_str())
        .bind(&counts)
        .bind(&failed)
        .bind(&errors)
        .execute(&self.pool)
        .await?;

        tracing::debug!(run_id = %run.id(), status = %run.status(), "Sync run recorded");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Most recently started run, whatever its outcome
    pub async fn latest_run(&self) -> Result<Option<SyncRun>, CacheError> {
        let row = sqlx::query("SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// Finish time of the latest fully successful run
    pub async fn last_successful_sync(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let finished: Option<String> = sqlx::query_scalar(
            r#"
            SELECT finished_at FROM sync_runs
            WHERE status = 'success' AND finished_at IS NOT NULL
            ORDER BY finished_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        finished.as_deref().map(parse_datetime).transpose()
    }

    pub async fn library_summary(&self) -> Result<LibrarySummary, CacheError> {
        let (bundles, products, downloads): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM bundles),
                   (SELECT COUNT(*) FROM products),
                   (SELECT COUNT(*) FROM downloads)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let categories: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*) AS n FROM products
            GROUP BY category
            ORDER BY n DESC, category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(LibrarySummary {
            bundles: to_u64(bundles),
            products: to_u64(products),
            downloads: to_u64(downloads),
            categories: categories
                .into_iter()
                .map(|(category, n)| CategoryCount {
                    category,
                    products: to_u64(n),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl IDataSyncer for SqliteLibraryRepository {
    async fn upsert_bundle(&self, bundle: &BundleRecord) -> Result<(), SyncError> {
        Ok(self.save_bundle(bundle).await?)
    }

    async fn upsert_product(
        &self,
        product: &ProductRecord,
        categorization: &Categorization,
    ) -> Result<(), SyncError> {
        Ok(self.save_product(product, categorization).await?)
    }

    async fn upsert_download(&self, download: &DownloadRecord) -> Result<(), SyncError> {
        Ok(self.save_download(download).await?)
    }

    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), SyncError> {
        Ok(self.save_run(run).await?)
    }
}

// ============================================================================
// Interval policy
// ============================================================================

/// A sync is due when no run has fully succeeded within the minimum interval
///
/// Partial, failed and cancelled runs do not postpone the next sync. A last
/// success stamped in the future (clock moved backward) counts as due.
pub struct LastSyncIntervalPolicy {
    repository: Arc<SqliteLibraryRepository>,
    min_interval: chrono::Duration,
}

impl LastSyncIntervalPolicy {
    pub fn new(repository: Arc<SqliteLibraryRepository>, min_interval: chrono::Duration) -> Self {
        Self {
            repository,
            min_interval,
        }
    }

    pub fn from_config(repository: Arc<SqliteLibraryRepository>, config: &SyncConfig) -> Self {
        Self::new(repository, config.min_interval())
    }

    pub fn min_interval(&self) -> chrono::Duration {
        self.min_interval
    }
}

#[async_trait]
impl ISyncIntervalPolicy for LastSyncIntervalPolicy {
    async fn is_sync_due(&self, now: DateTime<Utc>) -> Result<bool, SyncError> {
        let Some(last) = self.repository.last_successful_sync().await? else {
            return Ok(true);
        };
        if last > now {
            tracing::warn!(last_sync = %last, "Last sync is in the future, treating as due");
            return Ok(true);
        }
        Ok(now - last >= self.min_interval)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("Failed to parse datetime '{s}': {e}")))
}

fn run_from_row(row: &SqliteRow) -> Result<SyncRun, CacheError> {
    let id: String = row.try_get("id")?;
    let forced: bool = row.try_get("forced")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;
    let status: String = row.try_get("status")?;
    let counts: String = row.try_get("counts")?;
    let failed: String = row.try_get("failed_gamekeys")?;
    let errors: String = row.try_get("errors")?;

    let id = SyncRunId::from_str(&id).map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let status = SyncStatus::from_str(&status).map_err(CacheError::SerializationError)?;
    let counts: RunCounts = serde_json::from_str(&counts)?;
    let failed: Vec<Gamekey> = serde_json::from_str(&failed)?;
    let errors: Vec<RunError> = serde_json::from_str(&errors)?;

    Ok(SyncRun::restore(
        id,
        forced,
        parse_datetime(&started_at)?,
        finished_at.as_deref().map(parse_datetime).transpose()?,
        status,
        counts,
        failed,
        errors,
    ))
}
