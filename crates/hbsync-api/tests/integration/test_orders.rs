//! Order discovery, batch fetch and probe against a mock platform
//!
//! Errors are checked at the port level (`SyncError`), which is what the
//! orchestrator and the authentication flow actually see.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use hbsync_core::domain::{Gamekey, SyncError};
use hbsync_core::ports::{ILibraryProvider, ISessionProbe};

use crate::common::{self, SESSION_COOKIE, SESSION_VALUE};

fn key(s: &str) -> Gamekey {
    Gamekey::new(s).unwrap()
}

#[tokio::test]
async fn test_discover_gamekeys_dedups_and_skips_invalid() {
    let (server, provider) = common::setup_library_mock().await;
    common::mount_order_list(
        &server,
        json!([
            {"gamekey": "AAAA1111"},
            {"gamekey": "BBBB2222"},
            {"gamekey": "AAAA1111"},
            {"gamekey": "bad key!"},
            {"other": "field"},
            "not an object",
            {"gamekey": "CCCC3333"}
        ]),
    )
    .await;

    let session = common::session(&server.uri());
    let keys = provider.discover_gamekeys(&session).await.expect("discover");

    assert_eq!(keys, vec![key("AAAA1111"), key("BBBB2222"), key("CCCC3333")]);
}

#[tokio::test]
async fn test_discover_gamekeys_empty_library() {
    let (server, provider) = common::setup_library_mock().await;
    common::mount_order_list(&server, json!([])).await;

    let keys = provider
        .discover_gamekeys(&common::session(&server.uri()))
        .await
        .unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn test_requests_carry_session_cookie() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/user/order"))
        .and(header("cookie", format!("{SESSION_COOKIE}={SESSION_VALUE}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    provider
        .probe(&common::session(&server.uri()))
        .await
        .expect("probe with cookie");
}

#[tokio::test]
async fn test_fetch_orders_sends_every_gamekey() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .and(query_param("all_tpkds", "true"))
        .and(query_param("gamekeys", "AAAA1111"))
        .and(query_param("gamekeys", "BBBB2222"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AAAA1111": common::order("AAAA1111", "First Bundle"),
            "BBBB2222": common::order("BBBB2222", "Second Bundle"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = provider
        .fetch_orders(
            &common::session(&server.uri()),
            &[key("AAAA1111"), key("BBBB2222")],
        )
        .await
        .expect("fetch orders");

    let orders = body.as_object().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders["BBBB2222"]["product"]["human_name"], "Second Bundle");
}

#[tokio::test]
async fn test_fetch_orders_with_no_gamekeys_issues_no_request() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let body = provider
        .fetch_orders(&common::session(&server.uri()), &[])
        .await
        .unwrap();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_unauthorized_rejects_session() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/user/order"))
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .mount(&server)
        .await;

    let err = provider
        .probe(&common::session(&server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_auth_shaped(), "got {err:?}");
}

#[tokio::test]
async fn test_redirect_to_login_rejects_session() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/user/order"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/login?goto=%2Fapi%2Fv1%2Fuser%2Forder"),
        )
        .mount(&server)
        .await;

    let err = provider
        .discover_gamekeys(&common::session(&server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SessionRejected(_)), "got {err:?}");
}

#[tokio::test]
async fn test_throttling_is_transient_with_retry_after() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = provider
        .fetch_orders(&common::session(&server.uri()), &[key("AAAA1111")])
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = provider
        .fetch_orders(&common::session(&server.uri()), &[key("AAAA1111")])
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn test_other_client_error_is_remote_api_error() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = provider
        .fetch_orders(&common::session(&server.uri()), &[key("AAAA1111")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::RemoteApi {
            status: Some(404),
            ..
        }
    ));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let (server, provider) = common::setup_library_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider
        .fetch_orders(&common::session(&server.uri()), &[key("AAAA1111")])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_wrong_top_level_shape_is_parse_error() {
    let (server, provider) = common::setup_library_mock().await;
    common::mount_order_list(&server, json!({"gamekey": "AAAA1111"})).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["AAAA1111"])))
        .mount(&server)
        .await;

    let session = common::session(&server.uri());
    assert!(matches!(
        provider.discover_gamekeys(&session).await,
        Err(SyncError::Parse(_))
    ));
    assert!(matches!(
        provider.fetch_orders(&session, &[key("AAAA1111")]).await,
        Err(SyncError::Parse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let server = wiremock::MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = hbsync_api::LibraryClient::with_base_url(uri.clone()).unwrap();
    let provider = hbsync_api::HumbleLibraryProvider::new(client);
    let err = provider.probe(&common::session(&uri)).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
