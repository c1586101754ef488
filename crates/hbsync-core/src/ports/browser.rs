//! Browser driver port (driven/secondary port)
//!
//! The login flow never touches page markup directly; everything it needs
//! from the login page goes through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::SyncError;

/// Page interaction for the login flow
///
/// Failures are reported as:
/// - `SyncError::TransientNetwork` for anything worth retrying
/// - `SyncError::Authentication` when the remote explicitly rejects the
///   account (bad credentials, locked account)
#[async_trait]
pub trait IBrowserDriver: Send + Sync {
    /// Loads `url` into the browsing context
    async fn navigate(&self, url: &str) -> Result<(), SyncError>;

    /// Submits the login form
    async fn submit_credentials(&self, email: &str, password: &str) -> Result<(), SyncError>;

    /// Returns true if the page after submission asks for a secondary code
    async fn detect_secondary_challenge(&self) -> Result<bool, SyncError>;

    /// Submits an MFA code; returns whether the remote accepted it
    async fn submit_challenge_code(&self, code: &str) -> Result<bool, SyncError>;

    /// Cookies currently held for the platform origin
    async fn current_cookies(&self) -> Result<HashMap<String, String>, SyncError>;

    /// Expiry of each cookie that reports one
    ///
    /// Drivers that cannot see expirations return an empty map, in which
    /// case the session falls back to its configured maximum age.
    async fn cookie_expirations(&self) -> Result<HashMap<String, DateTime<Utc>>, SyncError> {
        Ok(HashMap::new())
    }
}
