//! Integration tests for hbsync-api
//!
//! Uses wiremock to simulate the platform and verifies the order client,
//! the status-to-error mapping at the port boundary, and the web login
//! driver end to end.

mod common;

mod test_auth_flow;
mod test_login;
mod test_orders;
