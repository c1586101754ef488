//! hbsync Cache - Local library storage
//!
//! SQLite-based storage for:
//! - Bundles (orders), products and their downloads
//! - Product categorization
//! - The history of sync runs
//!
//! ## Architecture
//!
//! This crate implements the `IDataSyncer` and `ISyncIntervalPolicy` ports
//! from `hbsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteLibraryRepository`] - `IDataSyncer` implementation plus read queries
//! - [`LastSyncIntervalPolicy`] - Minimum interval between unforced syncs
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use hbsync_cache::{DatabasePool, SqliteLibraryRepository};
//!
//! # async fn example() -> Result<(), hbsync_cache::CacheError> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/hbsync/library.db")).await?;
//! let repo = SqliteLibraryRepository::new(pool.pool().clone());
//! let summary = repo.library_summary().await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

use hbsync_core::domain::SyncError;

pub use pool::DatabasePool;
pub use repository::{CategoryCount, LastSyncIntervalPolicy, LibrarySummary, SqliteLibraryRepository};

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<CacheError> for SyncError {
    fn from(e: CacheError) -> Self {
        SyncError::Persistence(e.to_string())
    }
}
