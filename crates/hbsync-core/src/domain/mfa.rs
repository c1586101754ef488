//! Multi-factor challenge state
//!
//! An [`MfaChallenge`] lives only while the login flow waits for a
//! secondary-verification code. It bounds the wait and counts attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Shortest accepted MFA code
pub const MFA_CODE_MIN_LEN: usize = 4;

/// Longest accepted MFA code
pub const MFA_CODE_MAX_LEN: usize = 12;

/// Kind of secondary verification requested by the remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// A one-time code delivered by email
    EmailCode,
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailCode => write!(f, "email code"),
        }
    }
}

/// An in-progress multi-factor prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaChallenge {
    kind: ChallengeKind,
    issued_at: DateTime<Utc>,
    max_wait: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl MfaChallenge {
    /// Creates a new challenge issued now
    ///
    /// `max_attempts` is clamped to at least one.
    pub fn new(kind: ChallengeKind, max_wait: Duration, max_attempts: u32) -> Self {
        Self {
            kind,
            issued_at: Utc::now(),
            max_wait,
            max_attempts: max_attempts.max(1),
            attempts: 0,
        }
    }

    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts still available
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Returns true once every attempt has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Consumes one attempt
    ///
    /// Every supplied code counts, including ones rejected locally by
    /// [`MfaChallenge::validate_code`].
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Checks a code against the accepted character classes and length
    ///
    /// Surrounding whitespace is ignored. Returns the trimmed code.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidMfaCode` if the code is not ASCII
    /// alphanumeric or its length is outside 4..=12.
    pub fn validate_code<'a>(&self, code: &'a str) -> Result<&'a str, DomainError> {
        let code = code.trim();
        if !(MFA_CODE_MIN_LEN..=MFA_CODE_MAX_LEN).contains(&code.len()) {
            return Err(DomainError::InvalidMfaCode(format!(
                "expected {MFA_CODE_MIN_LEN} to {MFA_CODE_MAX_LEN} characters, got {}",
                code.len()
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidMfaCode(
                "only letters and digits are accepted".to_string(),
            ));
        }
        Ok(code)
    }
}
