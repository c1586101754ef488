//! hbsync API - HTTP adapter for the purchase-library platform
//!
//! Provides:
//! - Order-list discovery and batched order fetches
//! - A lightweight authenticated probe for stale sessions
//! - A cookie-jar web login implementing the browser driver port
//!
//! ## Modules
//!
//! - [`client`] - Cookie-authenticated HTTP client for the JSON API
//! - [`provider`] - `ILibraryProvider` / `ISessionProbe` implementation
//! - [`web_login`] - `IBrowserDriver` implementation over plain HTTP

pub mod client;
pub mod provider;
pub mod web_login;

pub use client::LibraryClient;
pub use provider::HumbleLibraryProvider;
pub use web_login::WebLoginDriver;

use std::time::Duration;

use hbsync_core::domain::SyncError;
use thiserror::Error;

/// Errors that can occur when talking to the platform
#[derive(Debug, Error)]
pub enum ApiError {
    /// The session cookies are missing or no longer accepted
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The session is not allowed to see the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The platform redirected an API call to its login page
    #[error("Redirected to login page: {0}")]
    LoginRedirect(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other unsuccessful status
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The login endpoint explicitly refused the account
    #[error("Login rejected: {0}")]
    LoginRejected(String),

    /// A configured URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match err {
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) | ApiError::LoginRedirect(_) => {
                SyncError::SessionRejected(message)
            }
            ApiError::TooManyRequests { retry_after } => SyncError::TransientNetwork {
                message,
                retry_after: Some(retry_after),
            },
            ApiError::ServerError { .. } => SyncError::transient(message),
            ApiError::Client { status, .. } => SyncError::RemoteApi {
                status: Some(status),
                message,
            },
            ApiError::NetworkError(e) => {
                if e.is_decode() {
                    SyncError::Parse(message)
                } else if e.is_builder() {
                    SyncError::RemoteApi {
                        status: None,
                        message,
                    }
                } else {
                    // timeouts, refused connections, reset streams
                    SyncError::transient(message)
                }
            }
            ApiError::InvalidResponse(_) => SyncError::Parse(message),
            ApiError::LoginRejected(reason) => SyncError::authentication(reason),
            ApiError::InvalidUrl(_) => SyncError::RemoteApi {
                status: None,
                message,
            },
        }
    }
}
