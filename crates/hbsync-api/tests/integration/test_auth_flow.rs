//! Authentication flow wired to the HTTP adapters
//!
//! Runs `AuthStateMachine` with the real web login driver and probe against
//! a mock platform; only the session store, credentials and code supplier
//! are in-memory stand-ins.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hbsync_api::{HumbleLibraryProvider, LibraryClient, WebLoginDriver};
use hbsync_core::domain::{AuthState, MfaChallenge, Session, SessionSummary, SyncError};
use hbsync_core::ports::{
    Credentials, ICredentialSource, ILibraryProvider, IMfaCodeSupplier, ISessionStore,
    SessionStoreError,
};
use hbsync_core::usecases::{AuthPorts, AuthSettings, AuthStateMachine};

#[derive(Default)]
struct MemoryStore {
    session: Mutex<Option<Session>>,
}

#[async_trait]
impl ISessionStore for MemoryStore {
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Session, SessionStoreError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or(SessionStoreError::NotFound)
    }

    async fn invalidate(&self) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn inspect(&self) -> Result<Option<SessionSummary>, SessionStoreError> {
        Ok(None)
    }
}

struct StaticCredentials;

impl ICredentialSource for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, SyncError> {
        Ok(Credentials::new("user@example.com", "hunter2"))
    }
}

struct FixedCode(&'static str);

#[async_trait]
impl IMfaCodeSupplier for FixedCode {
    async fn request_code(&self, _challenge: &MfaChallenge) -> Option<String> {
        Some(self.0.to_string())
    }
}

async fn mount_platform(server: &MockServer) {
    mount_platform_with_session_cookie(server, "_simpleauth_sess=fresh; Path=/").await;
}

async fn mount_platform_with_session_cookie(server: &MockServer, set_cookie: &str) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "csrf_cookie=tok; Path=/"),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .and(body_string_contains("guard=GUARD1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", set_cookie)
                .set_body_json(json!({"success": true})),
        )
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"humble_guard_required": true})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/user/order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"gamekey": "AAAA1111"}])))
        .mount(server)
        .await;
}

fn machine(
    server: &MockServer,
    store: Arc<MemoryStore>,
    provider: Arc<HumbleLibraryProvider>,
) -> AuthStateMachine {
    let ports = AuthPorts {
        store,
        browser: Arc::new(WebLoginDriver::with_base_url(&server.uri()).unwrap()),
        probe: provider,
        mfa: Arc::new(FixedCode("GUARD1")),
        credentials: Arc::new(StaticCredentials),
    };
    let settings = AuthSettings {
        origin: server.uri(),
        login_url: format!("{}/login", server.uri()),
        ..AuthSettings::default()
    };
    AuthStateMachine::new(ports, settings)
}

#[tokio::test]
async fn test_guarded_login_produces_usable_session() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let store = Arc::new(MemoryStore::default());
    let provider = Arc::new(HumbleLibraryProvider::new(
        LibraryClient::with_base_url(server.uri()).unwrap(),
    ));
    let mut auth = machine(&server, store.clone(), provider.clone());

    let session = auth.ensure_session().await.expect("login");

    assert_eq!(auth.state(), AuthState::LoginSucceeded);
    assert!(auth.history().contains(&AuthState::AwaitingMfa));
    assert!(auth.history().contains(&AuthState::MfaAccepted));
    assert_eq!(session.cookies()["_simpleauth_sess"], "fresh");
    assert_eq!(store.load().await.unwrap(), session);

    let keys = provider.discover_gamekeys(&session).await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn test_session_expiry_follows_shortest_lived_cookie() {
    let server = MockServer::start().await;
    mount_platform_with_session_cookie(&server, "_simpleauth_sess=fresh; Path=/; Max-Age=60")
        .await;

    let store = Arc::new(MemoryStore::default());
    let provider = Arc::new(HumbleLibraryProvider::new(
        LibraryClient::with_base_url(server.uri()).unwrap(),
    ));
    let mut auth = machine(&server, store, provider);

    let before = Utc::now();
    let session = auth.ensure_session().await.expect("login");
    let after = Utc::now();

    assert!(session.expires_at() >= before + Duration::seconds(60));
    assert!(session.expires_at() <= after + Duration::seconds(60));
}

#[tokio::test]
async fn test_session_without_cookie_expiry_uses_max_age() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let store = Arc::new(MemoryStore::default());
    let provider = Arc::new(HumbleLibraryProvider::new(
        LibraryClient::with_base_url(server.uri()).unwrap(),
    ));
    let mut auth = machine(&server, store, provider);
    let max_age = auth.settings().session_max_age;

    let session = auth.ensure_session().await.expect("login");

    assert_eq!(session.expires_at(), session.created_at() + max_age);
}
