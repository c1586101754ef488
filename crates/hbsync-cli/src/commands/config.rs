//! Config command - View and validate hbsync configuration
//!
//! Provides the `hbsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Prints the configuration file path
//! 3. Validates the configuration and reports every bad field

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Validate the configuration
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx, format),
            ConfigCommand::Path => self.execute_path(ctx, format),
            ConfigCommand::Validate => self.execute_validate(ctx, format),
        }
    }

    fn execute_show(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");
            let yaml = ctx.config.to_yaml().context("Failed to serialize configuration")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_path(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let exists = ctx.config_path.exists();
        if format.is_json() {
            get_formatter(format).print_json(&serde_json::json!({
                "path": ctx.config_path,
                "exists": exists,
            }));
        } else {
            println!("{}", ctx.config_path.display());
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let errors = ctx.config.validate();

        if format.is_json() {
            let list: Vec<_> = errors
                .iter()
                .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                .collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "errors": list,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
        } else {
            for error in &errors {
                formatter.error(&error.to_string());
            }
        }

        if !errors.is_empty() {
            bail!("Configuration has {} invalid field(s)", errors.len());
        }
        Ok(())
    }
}
