//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Gamekey
// ============================================================================

/// Minimum accepted gamekey length
pub const GAMEKEY_MIN_LEN: usize = 4;

/// Maximum accepted gamekey length
pub const GAMEKEY_MAX_LEN: usize = 64;

/// Opaque per-purchase identifier issued by the remote platform
///
/// A gamekey is ASCII alphanumeric and between [`GAMEKEY_MIN_LEN`] and
/// [`GAMEKEY_MAX_LEN`] characters long. It is never mutated after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gamekey(String);

impl Gamekey {
    /// Create a new Gamekey with validation
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidGamekey` if the value is not ASCII
    /// alphanumeric or its length is out of bounds.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let len = value.len();
        if !(GAMEKEY_MIN_LEN..=GAMEKEY_MAX_LEN).contains(&len) {
            return Err(DomainError::InvalidGamekey(format!(
                "length {len} outside {GAMEKEY_MIN_LEN}..={GAMEKEY_MAX_LEN}"
            )));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidGamekey(format!(
                "'{value}' contains non-alphanumeric characters"
            )));
        }
        Ok(Self(value))
    }

    /// Get the gamekey as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Gamekey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Gamekey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Gamekey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Gamekey> for String {
    fn from(key: Gamekey) -> Self {
        key.0
    }
}

impl AsRef<str> for Gamekey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SyncRunId
// ============================================================================

/// Identifier for SyncRun entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Create a new random SyncRunId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SyncRunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncRunId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::ValidationFailed(format!("Invalid UUID: {e}")))
    }
}
