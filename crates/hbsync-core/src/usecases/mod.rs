//! Use cases (application services)
//!
//! - [`AuthStateMachine`] - session validation, login and MFA

pub mod authenticate;

pub use authenticate::{AuthPorts, AuthSettings, AuthStateMachine, LOGIN_PATH};
