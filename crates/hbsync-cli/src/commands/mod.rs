//! CLI subcommands

pub mod auth;
pub mod config;
pub mod status;
pub mod sync;
