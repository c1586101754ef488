//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IBrowserDriver`] - Page interaction for the login flow
//! - [`IMfaCodeSupplier`] - Source of multi-factor codes (terminal, test harness)
//! - [`ICredentialSource`] - Account email and password
//! - [`ISessionStore`] - Encrypted session persistence
//! - [`ISessionProbe`] / [`ILibraryProvider`] - Remote platform API
//! - [`IDataSyncer`] / [`ISyncIntervalPolicy`] - Storage of library records and runs
//! - [`ICategorizer`] - Product categorization
//!
//! Every port reports failures as [`SyncError`](crate::domain::SyncError)
//! (or [`SessionStoreError`] for the session store), so no adapter-specific
//! error type crosses a port.

pub mod browser;
pub mod categorizer;
pub mod credentials;
pub mod data_syncer;
pub mod library;
pub mod mfa;
pub mod session_store;

pub use browser::IBrowserDriver;
pub use categorizer::ICategorizer;
pub use credentials::{Credentials, ICredentialSource};
pub use data_syncer::{IDataSyncer, ISyncIntervalPolicy};
pub use library::{ILibraryProvider, ISessionProbe};
pub use mfa::IMfaCodeSupplier;
pub use session_store::{ISessionStore, SessionStoreError};
