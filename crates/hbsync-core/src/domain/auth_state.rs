//! Authentication state machine states
//!
//! ```text
//! NoSession -> Validating -> {Valid, NeedsLogin}
//! NeedsLogin -> LoggingIn -> {AwaitingMfa, LoginSucceeded, LoginFailed}
//! AwaitingMfa -> {MfaAccepted, MfaFailed, MfaTimedOut}
//! MfaFailed -> {AwaitingMfa, LoginFailed}
//! MfaAccepted -> LoginSucceeded
//! ```
//!
//! A transient failure while logging in returns to `NeedsLogin` for the
//! next retry. A session rejected mid-run sends `Valid`/`LoginSucceeded`
//! back to `NeedsLogin`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// States of the authentication flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NoSession,
    Validating,
    Valid,
    NeedsLogin,
    LoggingIn,
    AwaitingMfa,
    MfaAccepted,
    MfaFailed,
    MfaTimedOut,
    LoginSucceeded,
    LoginFailed,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoSession => "NoSession",
            Self::Validating => "Validating",
            Self::Valid => "Valid",
            Self::NeedsLogin => "NeedsLogin",
            Self::LoggingIn => "LoggingIn",
            Self::AwaitingMfa => "AwaitingMFA",
            Self::MfaAccepted => "MFAAccepted",
            Self::MfaFailed => "MFAFailed",
            Self::MfaTimedOut => "MFATimedOut",
            Self::LoginSucceeded => "LoginSucceeded",
            Self::LoginFailed => "LoginFailed",
        }
    }

    /// States in which a usable session is held
    pub fn has_session(&self) -> bool {
        matches!(self, Self::Valid | Self::LoginSucceeded)
    }

    /// Terminal failure states
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::LoginFailed | Self::MfaTimedOut)
    }

    pub fn can_transition_to(&self, target: AuthState) -> bool {
        use AuthState::*;

        match (self, target) {
            (NoSession, Validating) | (NoSession, NeedsLogin) => true,

            (Validating, Valid) | (Validating, NeedsLogin) => true,

            (Valid, NeedsLogin) => true,

            (NeedsLogin, LoggingIn) | (NeedsLogin, LoginFailed) => true,

            (LoggingIn, AwaitingMfa)
            | (LoggingIn, LoginSucceeded)
            | (LoggingIn, LoginFailed)
            | (LoggingIn, NeedsLogin) => true,

            (AwaitingMfa, MfaAccepted)
            | (AwaitingMfa, MfaFailed)
            | (AwaitingMfa, MfaTimedOut)
            | (AwaitingMfa, LoginFailed)
            | (AwaitingMfa, NeedsLogin) => true,

            (MfaFailed, AwaitingMfa) | (MfaFailed, LoginFailed) => true,

            (MfaAccepted, LoginSucceeded)
            | (MfaAccepted, LoginFailed)
            | (MfaAccepted, NeedsLogin) => true,

            (LoginSucceeded, NeedsLogin) => true,

            // Any state may be reset (logout, new run)
            (_, NoSession) => true,

            _ => false,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current state plus the ordered list of states visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTrail {
    state: AuthState,
    history: Vec<AuthState>,
}

impl AuthTrail {
    pub fn new() -> Self {
        Self {
            state: AuthState::NoSession,
            history: vec![AuthState::NoSession],
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn history(&self) -> &[AuthState] {
        &self.history
    }

    /// Moves to `target`
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: AuthState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.state = target;
        self.history.push(target);
        Ok(())
    }

    /// Starts a fresh trail at `NoSession`
    pub fn reset(&mut self) {
        self.state = AuthState::NoSession;
        self.history.clear();
        self.history.push(AuthState::NoSession);
    }
}

impl Default for AuthTrail {
    fn default() -> Self {
        Self::new()
    }
}
