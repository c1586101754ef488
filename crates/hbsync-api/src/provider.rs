//! HumbleLibraryProvider - library and probe ports over [`LibraryClient`]
//!
//! Translates [`ApiError`](crate::ApiError) into the port-level
//! [`SyncError`] so nothing HTTP-specific reaches the orchestrator.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use hbsync_core::{
    config::RemoteConfig,
    domain::{Gamekey, Session, SyncError},
    ports::{ILibraryProvider, ISessionProbe},
};

use crate::client::LibraryClient;
use crate::ApiError;

/// Platform adapter for discovery, batch fetches and session probes
#[derive(Debug, Clone)]
pub struct HumbleLibraryProvider {
    client: LibraryClient,
}

impl HumbleLibraryProvider {
    pub fn new(client: LibraryClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, ApiError> {
        Ok(Self::new(LibraryClient::from_config(config)?))
    }

    pub fn client(&self) -> &LibraryClient {
        &self.client
    }
}

#[async_trait]
impl ISessionProbe for HumbleLibraryProvider {
    async fn probe(&self, session: &Session) -> Result<(), SyncError> {
        debug!(cookies = ?session.cookie_names(), "Probing session");
        self.client
            .check_session(session)
            .await
            .map_err(SyncError::from)
    }
}

#[async_trait]
impl ILibraryProvider for HumbleLibraryProvider {
    async fn discover_gamekeys(&self, session: &Session) -> Result<Vec<Gamekey>, SyncError> {
        self.client
            .list_gamekeys(session)
            .await
            .map_err(SyncError::from)
    }

    async fn fetch_orders(
        &self,
        session: &Session,
        gamekeys: &[Gamekey],
    ) -> Result<Value, SyncError> {
        self.client
            .fetch_orders(session, gamekeys)
            .await
            .map_err(SyncError::from)
    }
}
