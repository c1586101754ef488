//! Cookie-authenticated HTTP client for the platform's JSON API
//!
//! Every request carries the session cookies as a `Cookie` header; nothing
//! is kept between calls, so the same client serves the original session and
//! the one produced by a re-login.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hbsync_api::client::LibraryClient;
//! # use hbsync_core::domain::Session;
//!
//! # async fn example(session: &Session) -> Result<(), hbsync_api::ApiError> {
//! let client = LibraryClient::new()?;
//! let gamekeys = client.list_gamekeys(session).await?;
//! let orders = client.fetch_orders(session, &gamekeys[..gamekeys.len().min(35)]).await?;
//! println!("{} orders", orders.as_object().map(|o| o.len()).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use hbsync_core::{
    config::RemoteConfig,
    domain::{Gamekey, Session},
};
use reqwest::{header, redirect, Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ApiError;

/// Platform origin used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://www.humblebundle.com";

/// Lists every order of the signed-in account as `[{"gamekey": ..}]`
pub const ORDER_LIST_PATH: &str = "/api/v1/user/order";

/// Returns full order documents keyed by gamekey
pub const ORDERS_PATH: &str = "/api/v1/orders";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry-after duration when the header is missing or unreadable
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest server-requested wait that is honored as given
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Characters of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 200;

fn default_user_agent() -> String {
    format!("hbsync/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// LibraryClient
// ============================================================================

/// HTTP client for the order API
#[derive(Debug, Clone)]
pub struct LibraryClient {
    /// The underlying HTTP client (redirects disabled)
    client: Client,
    /// Origin without a trailing slash
    base_url: String,
}

impl LibraryClient {
    /// Creates a client for the public platform origin
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `base_url` - Origin that API paths are appended to
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_http_client(DEFAULT_TIMEOUT, &default_user_agent())?,
            base_url: trim_origin(base_url.into()),
        })
    }

    /// Creates a client from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, ApiError> {
        url::Url::parse(&config.base_url)?;
        Ok(Self {
            client: build_http_client(config.request_timeout(), &config.user_agent)?,
            base_url: trim_origin(config.base_url.clone()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder carrying the session cookies
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to the base URL (e.g. `/api/v1/orders`)
    /// * `session` - Session whose cookies authenticate the request
    pub fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, url)
            .header(header::COOKIE, session.cookie_header())
            .header(header::ACCEPT, "application/json")
    }

    /// Lists the gamekeys of every order in the library
    ///
    /// Entries without a well-formed gamekey are skipped with a warning.
    /// Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// - Status errors as described in [`check_status`]
    /// - `ApiError::InvalidResponse` if the body is not a JSON array
    pub async fn list_gamekeys(&self, session: &Session) -> Result<Vec<Gamekey>, ApiError> {
        debug!("Listing orders");
        let response = self
            .request(Method::GET, ORDER_LIST_PATH, session)
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;

        let entries = body
            .as_array()
            .ok_or_else(|| ApiError::InvalidResponse("order list is not an array".into()))?;

        let mut seen = HashSet::with_capacity(entries.len());
        let mut gamekeys = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;
        for entry in entries {
            let Some(raw) = entry.get("gamekey").and_then(Value::as_str) else {
                skipped += 1;
                continue;
            };
            match Gamekey::new(raw) {
                Ok(key) => {
                    if seen.insert(key.clone()) {
                        gamekeys.push(key);
                    }
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped order entries without a valid gamekey");
        }
        debug!(
            entries = entries.len(),
            unique = gamekeys.len(),
            "Order list received"
        );
        Ok(gamekeys)
    }

    /// Fetches full order documents for `gamekeys` in one request
    ///
    /// Returns the response object (gamekey -> order) undecoded.
    ///
    /// # Errors
    ///
    /// - Status errors as described in [`check_status`]
    /// - `ApiError::InvalidResponse` if the body is not a JSON object
    pub async fn fetch_orders(
        &self,
        session: &Session,
        gamekeys: &[Gamekey],
    ) -> Result<Value, ApiError> {
        if gamekeys.is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        let mut query: Vec<(&str, &str)> = Vec::with_capacity(gamekeys.len() + 1);
        query.push(("all_tpkds", "true"));
        query.extend(gamekeys.iter().map(|k| ("gamekeys", k.as_str())));

        debug!(count = gamekeys.len(), "Fetching orders");
        let response = self
            .request(Method::GET, ORDERS_PATH, session)
            .query(&query)
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;

        if !body.is_object() {
            return Err(ApiError::InvalidResponse(
                "order batch response is not an object".into(),
            ));
        }
        Ok(body)
    }

    /// Checks that the platform still accepts `session`
    ///
    /// Uses the order list, which is small and only served to signed-in
    /// accounts. The body is not decoded.
    pub async fn check_session(&self, session: &Session) -> Result<(), ApiError> {
        let response = self
            .request(Method::GET, ORDER_LIST_PATH, session)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Builds the HTTP client used by every adapter in this crate
///
/// Redirects are not followed: the platform answers an unauthenticated API
/// call with a redirect to its login page, which must surface as an error.
pub(crate) fn build_http_client(timeout: Duration, user_agent: &str) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?)
}

fn trim_origin(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Passes successful responses through and maps everything else to an [`ApiError`]
///
/// | Status            | Error                        |
/// |-------------------|------------------------------|
/// | 3xx to `/login`   | `LoginRedirect`              |
/// | 401               | `Unauthorized`               |
/// | 403               | `Forbidden`                  |
/// | 429               | `TooManyRequests`            |
/// | 5xx               | `ServerError`                |
/// | other             | `Client`                     |
pub async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.is_redirection() {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if location.contains("/login") {
            return Err(ApiError::LoginRedirect(location));
        }
        return Err(ApiError::Client {
            status: status.as_u16(),
            message: format!("unexpected redirect to '{location}'"),
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(ApiError::TooManyRequests { retry_after });
    }

    let message = error_excerpt(response).await;
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        s if s.is_server_error() => ApiError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => ApiError::Client {
            status: s.as_u16(),
            message,
        },
    })
}

async fn error_excerpt(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => body.trim().chars().take(ERROR_BODY_LIMIT).collect(),
        _ => status.canonical_reason().unwrap_or("no body").to_string(),
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts integer seconds or an HTTP date. Values above one hour, dates in
/// the past and unreadable values fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        if seconds <= MAX_RETRY_AFTER_SECS {
            return Duration::from_secs(seconds);
        }
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= MAX_RETRY_AFTER_SECS)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
