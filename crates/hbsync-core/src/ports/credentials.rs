//! Credential source port

use std::fmt;

use crate::domain::SyncError;

/// Account credentials for the login form
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials lazily, only when a login is actually needed
pub trait ICredentialSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when no credentials are available.
    fn credentials(&self) -> Result<Credentials, SyncError>;
}
