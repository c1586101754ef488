//! Web login driver over a cookie-jar HTTP client
//!
//! Implements [`IBrowserDriver`] without a browser: the login page is loaded
//! to obtain the CSRF cookie, credentials are posted to the login endpoint,
//! and the JSON reply tells whether a secondary code (guard or two-factor)
//! is required. Cookies set along the way accumulate in a [`Jar`] and are
//! exported for the session once the login completes. The jar does not
//! expose expiries, so `Max-Age` / `Expires` are read from each response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use hbsync_core::{
    config::RemoteConfig,
    domain::SyncError,
    ports::{Credentials, IBrowserDriver},
};

use crate::client::check_status;
use crate::ApiError;

/// Endpoint receiving the login form
pub const LOGIN_SUBMIT_PATH: &str = "/processlogin";

/// Cookie holding the anti-forgery token set by the login page
pub const CSRF_COOKIE: &str = "csrf_cookie";

/// Header the login endpoint expects the anti-forgery token in
pub const CSRF_HEADER: &str = "CSRF-Prevention-Token";

/// Page the platform sends the browser to after login
const LOGIN_LANDING: &str = "/home/library";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

// ============================================================================
// Login reply
// ============================================================================

/// JSON body returned by the login endpoint
#[derive(Debug, Default, Deserialize)]
struct LoginReply {
    #[serde(default)]
    success: bool,
    /// Emailed guard code required
    #[serde(default)]
    humble_guard_required: bool,
    /// Authenticator code required
    #[serde(default)]
    two_factor_required: bool,
    /// Field name -> messages, present on rejection
    #[serde(default)]
    errors: Option<Value>,
}

impl LoginReply {
    fn challenge(&self) -> Option<ChallengeField> {
        if self.humble_guard_required {
            Some(ChallengeField::Guard)
        } else if self.two_factor_required {
            Some(ChallengeField::TwoFactor)
        } else {
            None
        }
    }

    /// Flattens the `errors` object into one line
    fn error_message(&self) -> String {
        let mut messages = Vec::new();
        collect_strings(self.errors.as_ref(), &mut messages);
        if messages.is_empty() {
            "the platform refused the login".to_string()
        } else {
            messages.join("; ")
        }
    }
}

fn collect_strings(value: Option<&Value>, out: &mut Vec<String>) {
    match value {
        Some(Value::String(s)) => out.push(s.clone()),
        Some(Value::Array(items)) => items.iter().for_each(|v| collect_strings(Some(v), out)),
        Some(Value::Object(map)) => map.values().for_each(|v| collect_strings(Some(v), out)),
        _ => {}
    }
}

/// Form field that carries the secondary code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeField {
    Guard,
    TwoFactor,
}

impl ChallengeField {
    fn form_key(self) -> &'static str {
        match self {
            Self::Guard => "guard",
            Self::TwoFactor => "code",
        }
    }
}

/// State carried between the credential post and the code post
///
/// The code is submitted together with the credentials, so they are kept
/// until the login completes.
#[derive(Default)]
struct LoginState {
    credentials: Option<Credentials>,
    challenge: Option<ChallengeField>,
}

// ============================================================================
// WebLoginDriver
// ============================================================================

/// Browser driver implemented with plain HTTP requests and a cookie jar
pub struct WebLoginDriver {
    client: Client,
    jar: Arc<Jar>,
    origin: Url,
    state: Mutex<LoginState>,
    /// Cookie name -> expiry, from the `Set-Cookie` headers seen so far
    expirations: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl WebLoginDriver {
    /// Creates a driver for `origin` with default timeout and user agent
    pub fn with_base_url(origin: &str) -> Result<Self, ApiError> {
        Self::build(
            origin,
            DEFAULT_TIMEOUT,
            &format!("hbsync/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Creates a driver from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, ApiError> {
        Self::build(
            &config.base_url,
            config.request_timeout(),
            &config.user_agent,
        )
    }

    fn build(origin: &str, timeout: Duration, user_agent: &str) -> Result<Self, ApiError> {
        let origin = Url::parse(origin)?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            jar,
            origin,
            state: Mutex::new(LoginState::default()),
            expirations: Mutex::new(HashMap::new()),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Accepts absolute URLs and paths relative to the origin
    fn resolve(&self, url: &str) -> Result<Url, ApiError> {
        Ok(self.origin.join(url)?)
    }

    /// Value of one cookie currently held for the origin
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookie_map().remove(name)
    }

    fn cookie_map(&self) -> HashMap<String, String> {
        self.jar
            .cookies(&self.origin)
            .and_then(|value| value.to_str().ok().map(parse_cookie_header))
            .unwrap_or_default()
    }

    /// Merges cookie expiries read by [`set_cookie_expiries`]
    ///
    /// A cookie set again without an expiry becomes a session cookie, so
    /// its earlier expiry is dropped.
    async fn record_expirations(&self, seen: Vec<(String, Option<DateTime<Utc>>)>) {
        if seen.is_empty() {
            return;
        }
        let mut expirations = self.expirations.lock().await;
        for (name, expiry) in seen {
            match expiry {
                Some(at) => {
                    debug!(cookie = %name, expires_at = %at, "Cookie expiry recorded");
                    expirations.insert(name, at);
                }
                None => {
                    expirations.remove(&name);
                }
            }
        }
    }

    /// Posts the login form and decodes the reply
    ///
    /// 400 and 401 replies carry a JSON body describing the rejection or the
    /// pending challenge, so they are decoded like a success.
    async fn post_login(&self, form: &[(&str, &str)]) -> Result<LoginReply, ApiError> {
        let mut request = self
            .client
            .post(self.resolve(LOGIN_SUBMIT_PATH)?)
            .header(header::ACCEPT, "application/json")
            .form(form);
        match self.cookie(CSRF_COOKIE) {
            Some(token) => request = request.header(CSRF_HEADER, token),
            None => debug!("No anti-forgery cookie present, posting without it"),
        }

        let response = request.send().await?;
        let expiries = set_cookie_expiries(&response);
        self.record_expirations(expiries).await;
        let status = response.status();
        if status.is_success()
            || status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
        {
            let body = response.text().await?;
            return serde_json::from_str(&body)
                .map_err(|e| ApiError::InvalidResponse(format!("login reply: {e}")));
        }

        check_status(response).await?;
        Err(ApiError::InvalidResponse(format!(
            "unexpected login status {status}"
        )))
    }

    fn login_form<'a>(credentials: &'a Credentials) -> Vec<(&'a str, &'a str)> {
        vec![
            ("username", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
            ("goto", LOGIN_LANDING),
            ("qs", ""),
        ]
    }
}

#[async_trait]
impl IBrowserDriver for WebLoginDriver {
    async fn navigate(&self, url: &str) -> Result<(), SyncError> {
        let url = self.resolve(url)?;
        debug!(url = %url, "Loading page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::from)?;
        let expiries = set_cookie_expiries(&response);
        self.record_expirations(expiries).await;
        check_status(response).await?;
        debug!(
            csrf = self.cookie(CSRF_COOKIE).is_some(),
            "Page loaded"
        );
        Ok(())
    }

    async fn submit_credentials(&self, email: &str, password: &str) -> Result<(), SyncError> {
        let credentials = Credentials::new(email, password);
        let reply = self.post_login(&Self::login_form(&credentials)).await?;

        let mut state = self.state.lock().await;
        if let Some(field) = reply.challenge() {
            debug!(field = field.form_key(), "Secondary verification requested");
            state.credentials = Some(credentials);
            state.challenge = Some(field);
            return Ok(());
        }

        *state = LoginState::default();
        if reply.success {
            info!("Credentials accepted");
            Ok(())
        } else {
            Err(ApiError::LoginRejected(reply.error_message()).into())
        }
    }

    async fn detect_secondary_challenge(&self) -> Result<bool, SyncError> {
        Ok(self.state.lock().await.challenge.is_some())
    }

    async fn submit_challenge_code(&self, code: &str) -> Result<bool, SyncError> {
        let mut state = self.state.lock().await;
        let (Some(credentials), Some(field)) = (state.credentials.clone(), state.challenge) else {
            return Err(SyncError::authentication(
                "no verification challenge is pending",
            ));
        };

        let mut form = Self::login_form(&credentials);
        form.push((field.form_key(), code));
        let reply = self.post_login(&form).await?;

        if reply.success {
            info!("Verification code accepted");
            *state = LoginState::default();
            Ok(true)
        } else {
            debug!(reason = %reply.error_message(), "Verification code rejected");
            Ok(false)
        }
    }

    async fn current_cookies(&self) -> Result<HashMap<String, String>, SyncError> {
        Ok(self.cookie_map())
    }

    async fn cookie_expirations(&self) -> Result<HashMap<String, DateTime<Utc>>, SyncError> {
        Ok(self.expirations.lock().await.clone())
    }
}

/// Name and expiry of every cookie `response` sets
///
/// Only the final response of a redirect chain is visible here.
fn set_cookie_expiries(response: &Response) -> Vec<(String, Option<DateTime<Utc>>)> {
    let now = Utc::now();
    response
        .cookies()
        .map(|c| (c.name().to_string(), cookie_expiry(c.max_age(), c.expires(), now)))
        .collect()
}

/// Absolute expiry of a cookie; `Max-Age` takes precedence over `Expires`
fn cookie_expiry(
    max_age: Option<Duration>,
    expires: Option<SystemTime>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match max_age {
        Some(max_age) => chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_add_signed(age)),
        None => expires.map(DateTime::<Utc>::from),
    }
}

/// Splits a `Cookie` header value (`a=b; c=d`) into name/value pairs
fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}
