//! Domain error types
//!
//! This module defines two families of errors:
//! - [`DomainError`] for validation failures and invalid state transitions
//!   inside the domain model
//! - [`SyncError`] for the failure taxonomy shared by every port, so that no
//!   transport, browser or storage error leaks past the use case boundary

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Gamekey does not match the expected shape
    #[error("Invalid gamekey: {0}")]
    InvalidGamekey(String),

    /// MFA code does not match the accepted character classes or length
    #[error("Invalid MFA code: {0}")]
    InvalidMfaCode(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failure taxonomy for authentication and synchronization
///
/// Every adapter translates its own error type into one of these variants at
/// the port boundary. The orchestrator and the authentication state machine
/// only ever reason about `SyncError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Local I/O failure (session files, database)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persisted session failed its tamper check
    #[error("Session integrity check failed: {0}")]
    Integrity(String),

    /// Persisted session could not be decoded
    #[error("Session data is corrupt: {0}")]
    Corrupt(String),

    /// Login or MFA exhausted its attempts, or the remote rejected the account
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// Human readable cause
        reason: String,
    },

    /// Retryable network failure (timeouts, connection errors, 5xx, 429)
    #[error("Transient network error: {message}")]
    TransientNetwork {
        /// Description of the failure
        message: String,
        /// Server supplied `Retry-After` hint, if any
        retry_after: Option<Duration>,
    },

    /// Non-retryable 4xx-class remote error other than authentication
    #[error("Remote API error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    RemoteApi {
        /// HTTP status code, when one was received
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// Response body or record could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The remote service no longer accepts the current session
    #[error("Session rejected by remote service: {0}")]
    SessionRejected(String),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Shorthand for a transient error without a `Retry-After` hint
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Shorthand for an authentication failure
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Returns true if the failure means the session is no longer accepted
    pub fn is_auth_shaped(&self) -> bool {
        matches!(self, Self::SessionRejected(_))
    }

    /// Server supplied retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TransientNetwork { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
