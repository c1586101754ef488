//! Account credentials: email from the configuration, password from the
//! environment or the system keyring

use anyhow::{Context, Result};
use tracing::{debug, info};

use hbsync_core::domain::SyncError;
use hbsync_core::ports::{Credentials, ICredentialSource};

/// Keyring service name for stored passwords
const KEYRING_SERVICE: &str = "hbsync";

/// Environment variable that overrides the keyring
pub const PASSWORD_ENV: &str = "HBSYNC_PASSWORD";

/// Resolves credentials only when a login actually needs them
pub struct ConfiguredCredentials {
    email: Option<String>,
    password: Option<String>,
}

impl ConfiguredCredentials {
    pub fn new(email: Option<String>) -> Self {
        Self {
            email,
            password: None,
        }
    }

    /// Uses `password` instead of looking one up
    #[must_use]
    pub fn with_password(mut self, password: String) -> Self {
        self.password = Some(password);
        self
    }

    fn lookup_password(&self, email: &str) -> Result<String, SyncError> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                debug!("Using password from {PASSWORD_ENV}");
                return Ok(password);
            }
        }
        match load_password(email) {
            Ok(Some(password)) => Ok(password),
            Ok(None) => Err(SyncError::authentication(format!(
                "no password available; set {PASSWORD_ENV} or run 'hbsync login --save'"
            ))),
            Err(e) => Err(SyncError::authentication(format!("{e:#}"))),
        }
    }
}

impl ICredentialSource for ConfiguredCredentials {
    fn credentials(&self) -> Result<Credentials, SyncError> {
        let email = self.email.as_deref().ok_or_else(|| {
            SyncError::authentication("no account email; set auth.email in the configuration")
        })?;
        let password = self.lookup_password(email)?;
        Ok(Credentials::new(email, password))
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Stores the password for `email` in the system keyring
pub fn store_password(email: &str, password: &str) -> Result<()> {
    let entry =
        keyring::Entry::new(KEYRING_SERVICE, email).context("Failed to create keyring entry")?;
    entry
        .set_password(password)
        .context("Failed to store password in keyring")?;
    info!("Stored password in keyring");
    Ok(())
}

/// Reads the password for `email`, `None` when nothing is stored
pub fn load_password(email: &str) -> Result<Option<String>> {
    let entry =
        keyring::Entry::new(KEYRING_SERVICE, email).context("Failed to create keyring entry")?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => {
            debug!("No password stored in keyring");
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
    }
}

/// Removes the stored password; returns whether one existed
pub fn forget_password(email: &str) -> Result<bool> {
    let entry =
        keyring::Entry::new(KEYRING_SERVICE, email).context("Failed to create keyring entry")?;
    match entry.delete_credential() {
        Ok(()) => {
            info!("Removed password from keyring");
            Ok(true)
        }
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
    }
}
