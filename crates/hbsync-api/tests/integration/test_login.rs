//! Web login driver against a mock login endpoint

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hbsync_api::WebLoginDriver;
use hbsync_core::domain::SyncError;
use hbsync_core::ports::IBrowserDriver;

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "hunter2";

/// Mounts a login page that sets the anti-forgery cookie
async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "csrf_cookie=tok-123; Path=/")
                .set_body_string("<html>login</html>"),
        )
        .mount(server)
        .await;
}

fn session_cookie_reply() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Set-Cookie", "_simpleauth_sess=sess-xyz; Path=/; HttpOnly")
        .set_body_json(json!({"success": true, "goto": "/home/library"}))
}

async fn driver_for(server: &MockServer) -> WebLoginDriver {
    let driver = WebLoginDriver::with_base_url(&server.uri()).expect("driver");
    driver.navigate("/login").await.expect("navigate");
    driver
}

#[tokio::test]
async fn test_login_without_challenge() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .and(header("CSRF-Prevention-Token", "tok-123"))
        .and(body_string_contains("username=user%40example.com"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(session_cookie_reply())
        .expect(1)
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    driver.submit_credentials(EMAIL, PASSWORD).await.expect("login");

    assert!(!driver.detect_secondary_challenge().await.unwrap());
    let cookies = driver.current_cookies().await.unwrap();
    assert_eq!(cookies["_simpleauth_sess"], "sess-xyz");
    assert_eq!(cookies["csrf_cookie"], "tok-123");
    assert!(driver.cookie_expirations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cookie_max_age_is_reported_as_expiry() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "_simpleauth_sess=sess-xyz; Path=/; Max-Age=60")
                .set_body_json(json!({"success": true})),
        )
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    let before = Utc::now();
    driver.submit_credentials(EMAIL, PASSWORD).await.unwrap();
    let after = Utc::now();

    let expirations = driver.cookie_expirations().await.unwrap();
    let expires_at = expirations["_simpleauth_sess"];
    assert!(expires_at >= before + Duration::seconds(60));
    assert!(expires_at <= after + Duration::seconds(60));
    assert!(!expirations.contains_key("csrf_cookie"));
}

#[tokio::test]
async fn test_cookie_reset_without_expiry_drops_recorded_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "csrf_cookie=tok-123; Path=/; Max-Age=3600"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "csrf_cookie=tok-456; Path=/")
                .set_body_json(json!({"success": true})),
        )
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    assert!(driver
        .cookie_expirations()
        .await
        .unwrap()
        .contains_key("csrf_cookie"));

    driver.submit_credentials(EMAIL, PASSWORD).await.unwrap();

    assert!(driver.cookie_expirations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_guard_challenge_then_accepted_code() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .and(body_string_contains("guard=ABC123"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(session_cookie_reply())
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"humble_guard_required": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    driver.submit_credentials(EMAIL, PASSWORD).await.unwrap();
    assert!(driver.detect_secondary_challenge().await.unwrap());

    assert!(driver.submit_challenge_code("ABC123").await.unwrap());
    assert!(!driver.detect_secondary_challenge().await.unwrap());
    assert!(driver
        .current_cookies()
        .await
        .unwrap()
        .contains_key("_simpleauth_sess"));
}

#[tokio::test]
async fn test_two_factor_code_uses_code_field() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .and(body_string_contains("code=654321"))
        .respond_with(session_cookie_reply())
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"two_factor_required": true})),
        )
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    driver.submit_credentials(EMAIL, PASSWORD).await.unwrap();
    assert!(driver.submit_challenge_code("654321").await.unwrap());
}

#[tokio::test]
async fn test_wrong_code_is_rejected_and_challenge_stays_pending() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "humble_guard_required": true,
            "errors": {"guard": ["Invalid code"]}
        })))
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    driver.submit_credentials(EMAIL, PASSWORD).await.unwrap();

    assert!(!driver.submit_challenge_code("WRONG1").await.unwrap());
    assert!(driver.detect_secondary_challenge().await.unwrap());
    assert!(!driver.submit_challenge_code("WRONG2").await.unwrap());
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_error() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "errors": {"username": ["Invalid email or password"]}
        })))
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    let err = driver.submit_credentials(EMAIL, PASSWORD).await.unwrap_err();
    assert_eq!(
        err,
        SyncError::authentication("Invalid email or password")
    );
    assert!(!driver.detect_secondary_challenge().await.unwrap());
}

#[tokio::test]
async fn test_login_endpoint_outage_is_transient() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/processlogin"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let driver = driver_for(&server).await;
    let err = driver.submit_credentials(EMAIL, PASSWORD).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn test_login_page_outage_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let driver = WebLoginDriver::with_base_url(&server.uri()).unwrap();
    let err = driver.navigate("/login").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_code_without_pending_challenge_is_refused() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;

    let driver = driver_for(&server).await;
    let err = driver.submit_challenge_code("ABC123").await.unwrap_err();
    assert!(matches!(err, SyncError::Authentication { .. }));
}
