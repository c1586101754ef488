//! Configuration module for hbsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for hbsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub rate_limiting: RateLimitingConfig,
    pub sync: SyncConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Remote platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Origin of the platform, e.g. `https://www.humblebundle.com`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

/// Outbound request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Maximum requests admitted in any trailing 60 second window.
    pub requests_per_minute: u32,
}

/// Batched fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Gamekeys per order fetch.
    pub batch_size: usize,
    /// Retries per batch on transient failures.
    pub max_batch_retries: u32,
    /// First retry delay in seconds (doubles each retry).
    pub retry_base_secs: u64,
    /// Upper bound on any retry delay in seconds.
    pub retry_max_secs: u64,
    /// Minimum hours between unforced syncs.
    pub min_interval_hours: u64,
}

/// Login and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Account email. `None` until the user configures it or runs `hbsync login`.
    pub email: Option<String>,
    /// Seconds to wait for an MFA code.
    pub mfa_timeout_secs: u64,
    /// MFA codes accepted before the login is abandoned.
    pub mfa_max_attempts: u32,
    /// Retries on transient failures while logging in.
    pub login_retries: u32,
    /// Linear backoff step for login retries, in seconds.
    pub login_retry_base_secs: u64,
    /// A session validated within this many seconds is used without a probe.
    pub session_staleness_secs: u64,
    /// Session lifetime when no cookie reports an expiry.
    pub session_max_age_hours: u64,
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for all persistent state.
    pub data_dir: PathBuf,
    /// SQLite database file name, relative to `data_dir` unless absolute.
    pub database_file: PathBuf,
    /// Directory holding the encrypted session, relative to `data_dir` unless absolute.
    pub session_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/hbsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("hbsync")
            .join("config.yaml")
    }

    /// Serialize to YAML (used by `hbsync config show`).
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.humblebundle.com".to_string(),
            request_timeout_secs: 30,
            user_agent: format!("hbsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::domain::DEFAULT_BATCH_SIZE,
            max_batch_retries: 3,
            retry_base_secs: 1,
            retry_max_secs: 30,
            min_interval_hours: 24,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email: None,
            mfa_timeout_secs: 300,
            mfa_max_attempts: 3,
            login_retries: 2,
            login_retry_base_secs: 2,
            session_staleness_secs: 600,
            session_max_age_hours: 24,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("hbsync"),
            database_file: PathBuf::from("library.db"),
            session_dir: PathBuf::from("session"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived settings
// ---------------------------------------------------------------------------

/// Upper clamp for hour-valued settings (ten years).
const MAX_HOURS: u64 = 24 * 365 * 10;

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    /// Retry schedule for batch fetches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_batch_retries,
            Duration::from_secs(self.retry_base_secs),
            Duration::from_secs(self.retry_max_secs),
        )
    }

    pub fn min_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.min_interval_hours.min(MAX_HOURS) as i64)
    }
}

impl AuthConfig {
    /// Retry schedule for transient failures during login.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.login_retries,
            Duration::from_secs(self.login_retry_base_secs),
        )
    }

    pub fn mfa_timeout(&self) -> Duration {
        Duration::from_secs(self.mfa_timeout_secs)
    }

    pub fn session_staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_staleness_secs.min(MAX_HOURS * 3600) as i64)
    }

    pub fn session_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_max_age_hours.min(MAX_HOURS) as i64)
    }
}

impl StorageConfig {
    /// Absolute path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Absolute path of the session directory.
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(&self.session_dir)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut require_positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- remote / rate limiting / sync / auth ---
        require_positive("remote.request_timeout_secs", self.remote.request_timeout_secs);
        require_positive(
            "rate_limiting.requests_per_minute",
            u64::from(self.rate_limiting.requests_per_minute),
        );
        require_positive("sync.batch_size", self.sync.batch_size as u64);
        require_positive("sync.retry_base_secs", self.sync.retry_base_secs);
        require_positive("auth.mfa_timeout_secs", self.auth.mfa_timeout_secs);
        require_positive("auth.mfa_max_attempts", u64::from(self.auth.mfa_max_attempts));
        require_positive("auth.session_max_age_hours", self.auth.session_max_age_hours);

        if !(self.remote.base_url.starts_with("https://")
            || self.remote.base_url.starts_with("http://"))
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.remote.base_url),
            });
        }

        if self.sync.retry_max_secs < self.sync.retry_base_secs {
            errors.push(ValidationError {
                field: "sync.retry_max_secs".into(),
                message: "must be at least sync.retry_base_secs".into(),
            });
        }

        if let Some(email) = &self.auth.email {
            let valid = email
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                .unwrap_or(false);
            if !valid {
                errors.push(ValidationError {
                    field: "auth.email".into(),
                    message: format!("not a valid email address: {email}"),
                });
            }
        }

        // --- storage ---
        if self.storage.database_file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_file".into(),
                message: "must not be empty".into(),
            });
        }
        if self.storage.session_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.session_dir".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start a new builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.request_timeout_secs = secs;
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.requests_per_minute = n;
        self
    }

    // --- sync ---

    pub fn sync_batch_size(mut self, n: usize) -> Self {
        self.config.sync.batch_size = n;
        self
    }

    pub fn sync_max_batch_retries(mut self, n: u32) -> Self {
        self.config.sync.max_batch_retries = n;
        self
    }

    pub fn sync_min_interval_hours(mut self, hours: u64) -> Self {
        self.config.sync.min_interval_hours = hours;
        self
    }

    // --- auth ---

    pub fn auth_email(mut self, email: impl Into<String>) -> Self {
        self.config.auth.email = Some(email.into());
        self
    }

    pub fn auth_mfa_timeout_secs(mut self, secs: u64) -> Self {
        self.config.auth.mfa_timeout_secs = secs;
        self
    }

    pub fn auth_mfa_max_attempts(mut self, n: u32) -> Self {
        self.config.auth.mfa_max_attempts = n;
        self
    }

    pub fn auth_session_staleness_secs(mut self, secs: u64) -> Self {
        self.config.auth.session_staleness_secs = secs;
        self
    }

    // --- storage ---

    pub fn storage_data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
