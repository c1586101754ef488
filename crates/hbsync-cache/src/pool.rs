//! SQLite pool for the purchase library
//!
//! Opening a pool applies `migrations/20261019_initial.sql`, which creates
//! `bundles` (keyed by gamekey), `products` (keyed by product id, indexed by
//! category), the `bundle_products` link table, `downloads` (one row per
//! product, platform and download name) and `sync_runs`. Links and downloads
//! cascade when their bundle or product is deleted, so foreign keys are
//! switched on for every connection.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Wait on a locked database before a statement fails
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections held by a file-backed pool
pub const MAX_CONNECTIONS: u32 = 5;

/// Connections to `library.db`
///
/// A sync run writes through one connection while `status` may read through
/// another, so file databases use WAL, allow [`MAX_CONNECTIONS`] and wait up
/// to [`BUSY_TIMEOUT`] on a locked table before failing. The in-memory pool
/// keeps a single connection because every `sqlite::memory:` connection is
/// a separate, empty database.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the library database at `db_path`, creating the file and its
    /// parent directories on first use
    ///
    /// The schema statements are `IF NOT EXISTS`, so reopening an existing
    /// library leaves its rows alone.
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the directory or file cannot be
    /// created or opened, `CacheError::MigrationFailed` when the library
    /// tables cannot be created.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Database pool initialized");

        Ok(Self { pool })
    }

    /// Empty library held in memory, used by repository tests
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {e}"))
            })?;

        sqlx::raw_sql("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to enable foreign keys: {e}")))?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        let migration_sql = include_str!("migrations/20261019_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to run initial migration: {e}"))
            })?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}
