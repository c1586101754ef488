//! Domain entities and business logic
//!
//! This module contains the core domain types for hbsync:
//! - Newtypes for validated identifiers (`Gamekey`, `SyncRunId`)
//! - Session and session summary types
//! - Authentication states and the MFA challenge
//! - Fetch batches and the sync run entity
//! - Library records exchanged with the storage and categorization ports
//! - Domain and synchronization error types

pub mod auth_state;
pub mod batch;
pub mod errors;
pub mod mfa;
pub mod newtypes;
pub mod records;
pub mod session;
pub mod sync_run;

// Re-export commonly used types
pub use auth_state::{AuthState, AuthTrail};
pub use batch::{partition, FetchBatch, DEFAULT_BATCH_SIZE};
pub use errors::{DomainError, SyncError};
pub use mfa::{ChallengeKind, MfaChallenge};
pub use newtypes::*;
pub use records::{BundleRecord, Categorization, DownloadRecord, ProductRecord};
pub use session::{Session, SessionStatus, SessionSummary};
pub use sync_run::{RunCounts, RunError, SyncRun, SyncStatus};
