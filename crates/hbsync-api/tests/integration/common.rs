//! Shared test helpers for platform integration tests
//!
//! Each helper mounts the endpoints it needs on a fresh wiremock server and
//! returns clients pointing at it.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hbsync_api::{HumbleLibraryProvider, LibraryClient};
use hbsync_core::domain::Session;

pub const SESSION_COOKIE: &str = "_simpleauth_sess";
pub const SESSION_VALUE: &str = "abc123";

/// A session carrying one authentication cookie
pub fn session(origin: &str) -> Session {
    Session::new(
        BTreeMap::from([(SESSION_COOKIE.to_string(), SESSION_VALUE.to_string())]),
        origin,
        Utc::now(),
        Utc::now() + Duration::days(1),
    )
}

/// Starts a server and returns a provider pointed at it
pub async fn setup_library_mock() -> (MockServer, HumbleLibraryProvider) {
    let server = MockServer::start().await;
    let client = LibraryClient::with_base_url(server.uri()).expect("build client");
    (server, HumbleLibraryProvider::new(client))
}

/// Mounts `GET /api/v1/user/order` answering with `body`
pub async fn mount_order_list(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/user/order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Minimal order document as returned by the batch endpoint
pub fn order(gamekey: &str, name: &str) -> Value {
    json!({
        "gamekey": gamekey,
        "created": "2023-04-01T10:00:00.000000",
        "amount_spent": 12.5,
        "currency": "USD",
        "product": {
            "human_name": name,
            "machine_name": format!("{}_bundle", gamekey.to_lowercase()),
            "category": "bundle"
        },
        "subproducts": []
    })
}
