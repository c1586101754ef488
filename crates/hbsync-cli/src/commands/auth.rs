//! Session commands - Login, Logout and Session inspection
//!
//! Provides the `hbsync login`, `hbsync logout` and `hbsync session`
//! commands:
//! 1. `login`   - Reuses a valid persisted session or runs the web login,
//!    prompting for an MFA code when the platform asks for one.
//! 2. `logout`  - Removes the persisted session, optionally the stored password.
//! 3. `session` - Shows the session metadata without decrypting anything.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hbsync_core::domain::SessionStatus;
use hbsync_core::ports::ISessionStore;

use crate::context::AppContext;
use crate::credentials::{forget_password, store_password};
use crate::output::{get_formatter, OutputFormat};
use crate::prompt::read_line;

/// Log in to the platform
#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Discard any persisted session and log in again
    #[arg(long)]
    pub force_new: bool,

    /// Prompt for the password and store it in the system keyring
    #[arg(long)]
    pub save: bool,
}

impl LoginCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);

        let mut credentials = ctx.credentials();
        let mut entered_password = None;
        if self.save {
            let Some(email) = ctx.config.auth.email.as_deref() else {
                bail!(
                    "No account email configured. Set auth.email in {}",
                    ctx.config_path.display()
                );
            };
            let password = read_line(&format!("Password for {email}: "))
                .await?
                .filter(|password| !password.is_empty());
            let Some(password) = password else {
                bail!("No password entered");
            };
            credentials = credentials.with_password(password.clone());
            entered_password = Some(password);
        }

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let mut auth = ctx.auth_machine(Arc::new(credentials), cancel)?;
        let session = auth.login(self.force_new).await.context("Login failed")?;
        info!(
            cookies = session.cookies().len(),
            expires_at = %session.expires_at(),
            "Session established"
        );

        if let (Some(email), Some(password)) =
            (ctx.config.auth.email.as_deref(), entered_password.as_deref())
        {
            store_password(email, password)?;
            fmt.success("Password stored in keyring");
        }

        if format.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "cookies": session.cookies().len(),
                "created_at": session.created_at(),
                "expires_at": session.expires_at(),
            }));
        } else {
            fmt.success("Logged in");
            fmt.info(&format!("Session expires: {}", session.expires_at()));
        }
        Ok(())
    }
}

/// Remove the persisted session
#[derive(Debug, Args)]
pub struct LogoutCommand {
    /// Also delete the password stored in the system keyring
    #[arg(long)]
    pub forget_password: bool,
}

impl LogoutCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);

        let mut auth = ctx.auth_machine(Arc::new(ctx.credentials()), CancellationToken::new())?;
        auth.logout().await.context("Failed to remove session")?;

        let mut password_removed = false;
        if self.forget_password {
            match ctx.config.auth.email.as_deref() {
                Some(email) => password_removed = forget_password(email)?,
                None => fmt.warn("No account email configured; no password to forget"),
            }
        }

        if format.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "password_removed": password_removed,
            }));
        } else {
            fmt.success("Logged out");
            if password_removed {
                fmt.info("Stored password removed");
            }
        }
        Ok(())
    }
}

/// Show the persisted session
#[derive(Debug, Args)]
pub struct SessionCommand {}

impl SessionCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let store = ctx.session_store();
        let summary = store
            .inspect()
            .await
            .context("Failed to read session metadata")?;

        let now = Utc::now();
        let status = summary
            .as_ref()
            .map_or(SessionStatus::None, |s| s.status(now));

        if format.is_json() {
            fmt.print_json(&serde_json::json!({
                "status": status,
                "session": summary,
            }));
            return Ok(());
        }

        match summary {
            None => {
                fmt.info("No session. Run 'hbsync login' first.");
            }
            Some(summary) => {
                match status {
                    SessionStatus::Expired => fmt.warn("Session expired"),
                    _ => fmt.success("Session present"),
                }
                fmt.info(&format!("Created:        {}", summary.created_at));
                fmt.info(&format!("Last validated: {}", summary.last_validated_at));
                fmt.info(&format!("Expires:        {}", summary.expires_at));
                fmt.info(&format!("Cookies:        {}", summary.cookie_count));
            }
        }
        Ok(())
    }
}
