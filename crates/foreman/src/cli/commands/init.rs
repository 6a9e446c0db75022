//! Init command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use foreman_core::config::defaults::{default_config_toml, DEFAULT_CONFIG_TOML};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Write a default configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, default_config_toml())?;

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "config_path": config_path.to_string_lossy(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!(
                        "Wrote {}",
                        output::path_style().apply_to(config_path.display())
                    ));
                }
            }
        }

        Ok(())
    }
}
