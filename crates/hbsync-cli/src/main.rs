//! hbsync CLI - Command-line interface for hbsync
//!
//! Provides commands for:
//! - Logging in to the platform (with MFA) and managing the session
//! - Synchronizing the purchase library into the local database
//! - Viewing library and sync status
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod credentials;
mod output;
mod prompt;

use commands::{
    auth::{LoginCommand, LogoutCommand, SessionCommand},
    config::ConfigCommand,
    status::StatusCommand,
    sync::SyncCommand,
};
use context::AppContext;
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "hbsync", version, about = "Purchase library synchronization")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and persist the session
    Login(LoginCommand),
    /// Remove the persisted session
    Logout(LogoutCommand),
    /// Show the persisted session
    Session(SessionCommand),
    /// Synchronize the purchase library
    Sync(SyncCommand),
    /// Show library and sync status
    Status(StatusCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Level for the `-v` count, falling back to the configured level
fn log_filter(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let ctx = match AppContext::load(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            get_formatter(format).error(&format!("{e:#}"));
            std::process::exit(2);
        }
    };

    // Setup tracing: RUST_LOG wins, then -v, then the configured level
    let filter = log_filter(cli.verbose, &ctx.config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Login(cmd) => cmd.execute(&ctx, format).await,
        Commands::Logout(cmd) => cmd.execute(&ctx, format).await,
        Commands::Session(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    }
}
