//! Shared wiring for commands: configuration and adapter construction

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hbsync_api::{HumbleLibraryProvider, WebLoginDriver};
use hbsync_cache::{DatabasePool, LastSyncIntervalPolicy, SqliteLibraryRepository};
use hbsync_core::config::Config;
use hbsync_core::ports::ICredentialSource;
use hbsync_core::usecases::{AuthPorts, AuthSettings, AuthStateMachine};
use hbsync_session::EncryptedSessionStore;
use hbsync_sync::{
    KeywordCategorizer, SlidingWindowRateLimiter, SyncOrchestrator, SyncPorts, SyncSettings,
};

use crate::credentials::ConfiguredCredentials;
use crate::prompt::TerminalMfaPrompt;

/// Configuration plus the path it came from
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
}

impl AppContext {
    /// Loads the configuration
    ///
    /// An explicit `--config` path must exist. The default path falls back
    /// to built-in defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let (config_path, required) = match explicit {
            Some(path) => (path, true),
            None => (Config::default_path(), false),
        };

        if !config_path.exists() {
            if required {
                bail!("Configuration file not found: {}", config_path.display());
            }
            debug!(path = %config_path.display(), "No configuration file, using defaults");
            return Ok(Self {
                config: Config::default(),
                config_path,
            });
        }

        let config = Config::load(&config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn session_store(&self) -> Arc<EncryptedSessionStore> {
        Arc::new(EncryptedSessionStore::new(
            self.config.storage.session_path(),
        ))
    }

    /// Credentials for the configured account
    pub fn credentials(&self) -> ConfiguredCredentials {
        ConfiguredCredentials::new(self.config.auth.email.clone())
    }

    /// Builds the authentication state machine over the real adapters
    pub fn auth_machine(
        &self,
        credentials: Arc<dyn ICredentialSource>,
        cancel: CancellationToken,
    ) -> Result<AuthStateMachine> {
        let browser = WebLoginDriver::from_config(&self.config.remote)
            .context("Failed to create login client")?;
        let probe = HumbleLibraryProvider::from_config(&self.config.remote)
            .context("Failed to create API client")?;

        let ports = AuthPorts {
            store: self.session_store(),
            browser: Arc::new(browser),
            probe: Arc::new(probe),
            mfa: Arc::new(TerminalMfaPrompt::new()),
            credentials,
        };
        let settings = AuthSettings::from_config(&self.config);
        Ok(AuthStateMachine::new(ports, settings).with_cancellation(cancel))
    }

    /// Opens (creating if needed) the library database
    pub async fn open_repository(&self) -> Result<Arc<SqliteLibraryRepository>> {
        let path = self.config.storage.database_path();
        let db = DatabasePool::new(&path)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Arc::new(SqliteLibraryRepository::new(db.pool().clone())))
    }

    /// Wires the orchestrator for one `hbsync sync` invocation
    pub async fn orchestrator(&self, cancel: CancellationToken) -> Result<SyncOrchestrator> {
        let repository = self.open_repository().await?;
        let library = HumbleLibraryProvider::from_config(&self.config.remote)
            .context("Failed to create API client")?;
        let auth = self.auth_machine(Arc::new(self.credentials()), cancel.clone())?;

        let ports = SyncPorts {
            library: Arc::new(library),
            syncer: repository.clone(),
            categorizer: Arc::new(KeywordCategorizer::new()),
            interval: Arc::new(LastSyncIntervalPolicy::from_config(
                repository,
                &self.config.sync,
            )),
        };
        let limiter = Arc::new(SlidingWindowRateLimiter::from_config(
            &self.config.rate_limiting,
        ));

        Ok(
            SyncOrchestrator::new(auth, ports, limiter, SyncSettings::from_config(&self.config))
                .with_cancellation(cancel),
        )
    }
}
