//! Session store port
//!
//! The session is persisted as two artifacts: a plaintext metadata summary
//! (timestamps, expiry, signature) that can be read cheaply, and an
//! encrypted payload holding the cookies and origin.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Session, SessionSummary, SyncError};

/// Errors reported by a session store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// No session has been persisted
    #[error("No persisted session")]
    NotFound,

    /// The payload does not match its signature
    #[error("Session integrity check failed: {0}")]
    Integrity(String),

    /// The payload or metadata could not be decoded
    #[error("Session data is corrupt: {0}")]
    Corrupt(String),

    /// Underlying I/O failure
    #[error("Session persistence failed: {0}")]
    Persistence(String),
}

impl From<SessionStoreError> for SyncError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NotFound => SyncError::authentication("no persisted session"),
            SessionStoreError::Integrity(msg) => SyncError::Integrity(msg),
            SessionStoreError::Corrupt(msg) => SyncError::Corrupt(msg),
            SessionStoreError::Persistence(msg) => SyncError::Persistence(msg),
        }
    }
}

/// Encrypted session persistence
#[async_trait]
pub trait ISessionStore: Send + Sync {
    /// Signs, encrypts and atomically persists `session`
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Persistence` on I/O failure.
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Loads and verifies the persisted session
    ///
    /// # Errors
    ///
    /// - `NotFound` if no metadata summary exists
    /// - `Corrupt` if the payload cannot be decrypted or decoded
    /// - `Integrity` if the payload does not match the recorded signature
    async fn load(&self) -> Result<Session, SessionStoreError>;

    /// Removes all persisted session material; succeeds if none exists
    async fn invalidate(&self) -> Result<(), SessionStoreError>;

    /// Reads only the metadata summary, without decrypting
    async fn inspect(&self) -> Result<Option<SessionSummary>, SessionStoreError>;
}
