//! Authentication use case
//!
//! Drives the session lifecycle: restores and validates a persisted session,
//! logs in through the browser driver when needed (including the MFA
//! challenge), and persists the resulting session. Every transition is
//! recorded in an [`AuthTrail`] so callers and tests can inspect the path
//! taken.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::{AuthState, AuthTrail, ChallengeKind, MfaChallenge, Session, SyncError},
    ports::{
        Credentials, IBrowserDriver, ICredentialSource, IMfaCodeSupplier, ISessionProbe,
        ISessionStore, SessionStoreError,
    },
    retry::{sleep_or_cancel, RetryPolicy},
};

/// Login page path relative to the platform origin
pub const LOGIN_PATH: &str = "/login";

/// Tunables for the authentication flow
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Origin recorded in every new session
    pub origin: String,
    /// Page the browser driver loads before submitting credentials
    pub login_url: String,
    /// A session validated within this window is used without a probe
    pub staleness: chrono::Duration,
    /// Session lifetime when no cookie reports an expiry
    pub session_max_age: chrono::Duration,
    /// Maximum wait for an MFA code
    pub mfa_timeout: Duration,
    /// MFA codes accepted before the login is abandoned
    pub mfa_max_attempts: u32,
    /// Retry schedule for transient failures while logging in
    pub retry: RetryPolicy,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        let origin = config.remote.base_url.trim_end_matches('/').to_string();
        Self {
            login_url: format!("{origin}{LOGIN_PATH}"),
            origin,
            staleness: config.auth.session_staleness(),
            session_max_age: config.auth.session_max_age(),
            mfa_timeout: config.auth.mfa_timeout(),
            mfa_max_attempts: config.auth.mfa_max_attempts,
            retry: config.auth.retry_policy(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators needed by [`AuthStateMachine`]
#[derive(Clone)]
pub struct AuthPorts {
    pub store: Arc<dyn ISessionStore>,
    pub browser: Arc<dyn IBrowserDriver>,
    pub probe: Arc<dyn ISessionProbe>,
    pub mfa: Arc<dyn IMfaCodeSupplier>,
    pub credentials: Arc<dyn ICredentialSource>,
}

/// Outcome of one wait for an MFA code
enum MfaWait {
    Code(String),
    TimedOut,
    Cancelled,
}

/// Authentication state machine
///
/// Owns no session itself: a successful call hands the session to the
/// caller, and the persisted copy belongs to the session store.
pub struct AuthStateMachine {
    store: Arc<dyn ISessionStore>,
    browser: Arc<dyn IBrowserDriver>,
    probe: Arc<dyn ISessionProbe>,
    mfa: Arc<dyn IMfaCodeSupplier>,
    credentials: Arc<dyn ICredentialSource>,
    settings: AuthSettings,
    cancel: CancellationToken,
    trail: AuthTrail,
}

impl AuthStateMachine {
    /// Creates a new state machine in `NoSession`
    ///
    /// # Arguments
    ///
    /// * `ports` - Session store, browser driver, probe, MFA supplier and credentials
    /// * `settings` - Timeouts, retry schedule and login URL
    pub fn new(ports: AuthPorts, settings: AuthSettings) -> Self {
        Self {
            store: ports.store,
            browser: ports.browser,
            probe: ports.probe,
            mfa: ports.mfa,
            credentials: ports.credentials,
            settings,
            cancel: CancellationToken::new(),
            trail: AuthTrail::new(),
        }
    }

    /// Uses `token` to abort retry sleeps and the MFA wait
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> AuthState {
        self.trail.state()
    }

    /// States visited since the last reset
    pub fn history(&self) -> &[AuthState] {
        self.trail.history()
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Returns a usable session, logging in if necessary
    ///
    /// This method:
    /// 1. Loads the persisted session (missing, corrupt or tampered means login)
    /// 2. Uses it directly if it is fresh and unexpired
    /// 3. Otherwise probes the remote service with it
    /// 4. Logs in when the session is rejected
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The login flow is exhausted (`SyncError::Authentication`)
    /// - The probe fails for a reason unrelated to the session (the session
    ///   is kept for the next run)
    /// - The flow is cancelled (`SyncError::Cancelled`)
    pub async fn ensure_session(&mut self) -> Result<Session, SyncError> {
        self.trail.reset();
        self.enter(AuthState::Validating)?;

        let session = match self.store.load().await {
            Ok(session) => session,
            Err(SessionStoreError::NotFound) => {
                info!("No persisted session, login required");
                return self.login_from_scratch().await;
            }
            Err(err) => {
                warn!(error = %err, "Persisted session unusable, starting fresh");
                self.discard_persisted().await;
                return self.login_from_scratch().await;
            }
        };

        let now = Utc::now();
        if session.is_expired(now) {
            info!(expires_at = %session.expires_at(), "Persisted session expired");
            self.discard_persisted().await;
            return self.login_from_scratch().await;
        }

        if session.is_fresh(now, self.settings.staleness) {
            debug!(
                last_validated_at = %session.last_validated_at(),
                "Session is fresh, skipping remote validation"
            );
            self.enter(AuthState::Valid)?;
            return Ok(session);
        }

        self.validate_remotely(session).await
    }

    /// Discards the current session and logs in again
    ///
    /// Used by the orchestrator when the remote rejects the session mid-run.
    pub async fn reauthenticate(&mut self) -> Result<Session, SyncError> {
        info!("Session rejected mid-run, re-authenticating");
        self.discard_persisted().await;
        if !self.trail.state().has_session() {
            self.trail.reset();
        }
        self.login_from_scratch().await
    }

    /// Logs in, reusing a valid persisted session unless `force_new` is set
    pub async fn login(&mut self, force_new: bool) -> Result<Session, SyncError> {
        if !force_new {
            return self.ensure_session().await;
        }
        info!("Forcing a new login");
        self.trail.reset();
        self.discard_persisted().await;
        self.login_from_scratch().await
    }

    /// Removes the persisted session
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Persistence` if the session files cannot be removed.
    pub async fn logout(&mut self) -> Result<(), SyncError> {
        self.store.invalidate().await?;
        self.trail.reset();
        info!("Logged out, persisted session removed");
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    async fn validate_remotely(&mut self, mut session: Session) -> Result<Session, SyncError> {
        debug!("Probing remote service with persisted session");
        match self.probe.probe(&session).await {
            Ok(()) => {
                session.mark_validated(Utc::now());
                if let Err(err) = self.store.save(&session).await {
                    warn!(error = %err, "Failed to record session validation");
                }
                self.enter(AuthState::Valid)?;
                info!("Persisted session is valid");
                Ok(session)
            }
            Err(err) if err.is_auth_shaped() => {
                warn!(error = %err, "Remote service rejected persisted session");
                self.discard_persisted().await;
                self.login_from_scratch().await
            }
            Err(err) => {
                error!(
                    error = %err,
                    "Could not validate session; keeping it for the next attempt"
                );
                Err(err)
            }
        }
    }

    // ========================================================================
    // Login
    // ========================================================================

    async fn login_from_scratch(&mut self) -> Result<Session, SyncError> {
        self.enter(AuthState::NeedsLogin)?;
        self.login_with_retry().await
    }

    /// Runs the login flow with bounded retries on transient failures
    ///
    /// The retry budget is separate from the MFA attempt counter.
    async fn login_with_retry(&mut self) -> Result<Session, SyncError> {
        let credentials = match self.credentials.credentials() {
            Ok(credentials) => credentials,
            Err(err) => {
                self.mark_login_failed();
                return Err(match err {
                    SyncError::Authentication { .. } => err,
                    other => SyncError::authentication(other.to_string()),
                });
            }
        };

        let policy = self.settings.retry;
        let mut retries = 0u32;

        loop {
            self.enter(AuthState::LoggingIn)?;

            let err = match self.attempt_login(&credentials).await {
                Ok(session) => return Ok(session),
                Err(err) => err,
            };

            if matches!(err, SyncError::Cancelled) {
                self.mark_login_failed();
                return Err(err);
            }

            if err.is_transient() && policy.allows_retry(retries) {
                let delay = policy.delay_with_hint(retries, err.retry_after());
                retries += 1;
                warn!(
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error during login, retrying"
                );
                self.enter(AuthState::NeedsLogin)?;
                if !sleep_or_cancel(delay, &self.cancel).await {
                    self.mark_login_failed();
                    return Err(SyncError::Cancelled);
                }
                continue;
            }

            self.mark_login_failed();
            let reason = match err {
                SyncError::Authentication { reason } => reason,
                other if other.is_transient() => {
                    format!("login failed after {retries} retries: {other}")
                }
                other => other.to_string(),
            };
            error!(reason = %reason, "Login failed");
            return Err(SyncError::Authentication { reason });
        }
    }

    /// One pass through the login page, including the MFA challenge
    async fn attempt_login(&mut self, credentials: &Credentials) -> Result<Session, SyncError> {
        let browser = Arc::clone(&self.browser);

        browser.navigate(&self.settings.login_url).await?;
        browser
            .submit_credentials(&credentials.email, &credentials.password)
            .await?;

        if browser.detect_secondary_challenge().await? {
            self.enter(AuthState::AwaitingMfa)?;
            self.await_mfa().await?;
        }

        let cookies = browser.current_cookies().await?;
        if cookies.is_empty() {
            return Err(SyncError::authentication(
                "login completed but no session cookies were issued",
            ));
        }
        let expirations = browser.cookie_expirations().await?;

        let session = Session::from_login(
            cookies,
            &expirations,
            self.settings.origin.clone(),
            Utc::now(),
            self.settings.session_max_age,
        );
        self.enter(AuthState::LoginSucceeded)?;
        info!(
            cookies = session.cookies().len(),
            expires_at = %session.expires_at(),
            "Login succeeded"
        );

        if let Err(err) = self.store.save(&session).await {
            warn!(error = %err, "Failed to persist session; it is only valid for this process");
        }
        Ok(session)
    }

    /// Waits for MFA codes until one is accepted, attempts run out, the
    /// challenge times out, or the flow is cancelled
    async fn await_mfa(&mut self) -> Result<(), SyncError> {
        let mut challenge = MfaChallenge::new(
            ChallengeKind::EmailCode,
            self.settings.mfa_timeout,
            self.settings.mfa_max_attempts,
        );
        info!(
            kind = %challenge.kind(),
            max_attempts = challenge.max_attempts(),
            timeout_secs = challenge.max_wait().as_secs(),
            "Secondary verification required"
        );

        let deadline = tokio::time::Instant::now() + challenge.max_wait();
        let supplier = Arc::clone(&self.mfa);
        let browser = Arc::clone(&self.browser);
        let cancel = self.cancel.clone();

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => MfaWait::Cancelled,
                result = tokio::time::timeout_at(deadline, supplier.request_code(&challenge)) => {
                    match result {
                        Ok(Some(code)) => MfaWait::Code(code),
                        Ok(None) | Err(_) => MfaWait::TimedOut,
                    }
                }
            };

            let code = match outcome {
                MfaWait::Code(code) => code,
                MfaWait::TimedOut => {
                    self.enter(AuthState::MfaTimedOut)?;
                    warn!(
                        attempts = challenge.attempts(),
                        "No MFA code supplied before the challenge expired"
                    );
                    return Err(SyncError::authentication(format!(
                        "no MFA code supplied within {}s",
                        challenge.max_wait().as_secs()
                    )));
                }
                MfaWait::Cancelled => {
                    self.enter(AuthState::MfaTimedOut)?;
                    info!("MFA wait cancelled");
                    return Err(SyncError::Cancelled);
                }
            };

            challenge.record_attempt();
            let accepted = match challenge.validate_code(&code) {
                Ok(valid) => browser.submit_challenge_code(valid).await?,
                Err(err) => {
                    warn!(
                        attempt = challenge.attempts(),
                        error = %err,
                        "Malformed MFA code, not submitted"
                    );
                    false
                }
            };

            if accepted {
                self.enter(AuthState::MfaAccepted)?;
                info!(attempt = challenge.attempts(), "MFA code accepted");
                return Ok(());
            }

            self.enter(AuthState::MfaFailed)?;
            if challenge.is_exhausted() {
                self.enter(AuthState::LoginFailed)?;
                return Err(SyncError::authentication(format!(
                    "MFA code rejected {} times",
                    challenge.attempts()
                )));
            }
            warn!(
                remaining = challenge.remaining_attempts(),
                "MFA code rejected"
            );
            self.enter(AuthState::AwaitingMfa)?;
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn enter(&mut self, next: AuthState) -> Result<(), SyncError> {
        debug!(from = %self.trail.state(), to = %next, "Auth state transition");
        self.trail
            .transition_to(next)
            .map_err(|err| SyncError::authentication(err.to_string()))
    }

    fn mark_login_failed(&mut self) {
        if self.trail.state().is_failure() {
            return;
        }
        if let Err(err) = self.trail.transition_to(AuthState::LoginFailed) {
            warn!(error = %err, "Could not record login failure");
        }
    }

    async fn discard_persisted(&self) {
        if let Err(err) = self.store.invalidate().await {
            warn!(error = %err, "Failed to remove persisted session");
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
