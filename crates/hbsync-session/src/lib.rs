//! hbsync Session - Encrypted session persistence
//!
//! This crate implements [`ISessionStore`](hbsync_core::ports::ISessionStore)
//! on the local filesystem:
//! - `session.bin` holds the session (cookies and origin) encrypted with
//!   AES-256-GCM
//! - `session.meta.json` holds a plaintext summary and an HMAC-SHA256
//!   signature of the encrypted payload
//! - `session.key` holds the 32-byte master key from which the encryption
//!   and MAC keys are derived
//!
//! Every file is written to a temporary sibling and renamed into place.

pub mod crypto;
pub mod store;

pub use crypto::{CryptoError, SecureKey, SessionKeys};
pub use store::EncryptedSessionStore;
