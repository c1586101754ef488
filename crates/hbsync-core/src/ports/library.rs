//! Remote library port (driven/secondary port)
//!
//! The session is passed explicitly to every call: the orchestrator borrows
//! it for the duration of one run and swaps it after a re-login.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Gamekey, Session, SyncError};

/// Lightweight authenticated-only request used to validate a stale session
#[async_trait]
pub trait ISessionProbe: Send + Sync {
    /// Succeeds if the remote still accepts `session`
    ///
    /// # Errors
    ///
    /// - `SyncError::SessionRejected` if the remote refuses the session
    /// - `SyncError::TransientNetwork` (or another variant) for failures that
    ///   say nothing about the session itself
    async fn probe(&self, session: &Session) -> Result<(), SyncError>;
}

/// Identifier discovery and batched record fetches
#[async_trait]
pub trait ILibraryProvider: Send + Sync {
    /// Returns every gamekey in the library, de-duplicated, in discovery order
    async fn discover_gamekeys(&self, session: &Session) -> Result<Vec<Gamekey>, SyncError>;

    /// Fetches the raw order documents for `gamekeys` in one request
    ///
    /// The response is returned undecoded; decomposing it into records is
    /// the orchestrator's job.
    async fn fetch_orders(&self, session: &Session, gamekeys: &[Gamekey])
        -> Result<Value, SyncError>;
}
