//! Authenticated session types
//!
//! A [`Session`] is one authenticated browsing context: the cookie jar the
//! remote platform issued at login, the origin it belongs to, and the
//! timestamps that decide whether it can be used as-is, must be re-validated,
//! or has expired.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One authenticated browsing context
///
/// Equality compares cookie content and origin only; timestamps and the
/// signature are bookkeeping.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    cookies: BTreeMap<String, String>,
    origin: String,
    created_at: DateTime<Utc>,
    last_validated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(skip)]
    signature: Option<String>,
}

impl Session {
    /// Creates a session from an explicit set of fields
    pub fn new(
        cookies: BTreeMap<String, String>,
        origin: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cookies,
            origin: origin.into(),
            created_at,
            last_validated_at: created_at,
            expires_at,
            signature: None,
        }
    }

    /// Builds a session from the cookie jar left behind by a successful login
    ///
    /// The declared expiry is the earliest expiry among `cookie_expirations`,
    /// or `now + max_age` when no cookie reports one.
    pub fn from_login(
        cookies: HashMap<String, String>,
        cookie_expirations: &HashMap<String, DateTime<Utc>>,
        origin: impl Into<String>,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Self {
        let expires_at = cookie_expirations
            .iter()
            .filter(|(name, _)| cookies.contains_key(*name))
            .map(|(_, at)| *at)
            .min()
            .unwrap_or(now + max_age);

        Self::new(cookies.into_iter().collect(), origin, now, expires_at)
    }

    /// Attaches the tamper-detection signature computed by the session store
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Overrides the last-validated timestamp (used when restoring)
    #[must_use]
    pub fn with_last_validated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_validated_at = at;
        self
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_validated_at(&self) -> DateTime<Utc> {
        self.last_validated_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Returns true once the declared expiry has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the session was validated within `staleness`
    ///
    /// A last-validated timestamp in the future (clock moved backward) is
    /// treated as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        let age = now - self.last_validated_at;
        age >= Duration::zero() && age <= staleness
    }

    /// Records a successful validation against the remote service
    pub fn mark_validated(&mut self, now: DateTime<Utc>) {
        self.last_validated_at = now;
    }

    /// Renders the cookies as a `Cookie` request header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Cookie names only, safe to log
    pub fn cookie_names(&self) -> Vec<&str> {
        self.cookies.keys().map(String::as_str).collect()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.cookies == other.cookies && self.origin == other.origin
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookie_names())
            .field("origin", &self.origin)
            .field("created_at", &self.created_at)
            .field("last_validated_at", &self.last_validated_at)
            .field("expires_at", &self.expires_at)
            .field("signed", &self.signature.is_some())
            .finish()
    }
}

// ============================================================================
// SessionSummary
// ============================================================================

/// Status of the persisted session as seen from its metadata alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session is persisted
    None,
    /// A session is persisted and has not reached its declared expiry
    Valid,
    /// A session is persisted but its declared expiry has passed
    Expired,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Valid => "valid",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Plaintext summary of a persisted session, readable without decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub created_at: DateTime<Utc>,
    pub last_validated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cookie_count: usize,
}

impl SessionSummary {
    /// Status at `now`
    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        if now >= self.expires_at {
            SessionStatus::Expired
        } else {
            SessionStatus::Valid
        }
    }
}
