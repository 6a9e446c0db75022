//! CLI commands

mod blob;
mod init;
mod task;
mod validate;

pub use blob::BlobCommand;
pub use init::InitCommand;
pub use task::TaskCommand;
pub use validate::ValidateCommand;

use std::path::PathBuf;

use foreman_core::config::validation::validate_config;
use foreman_core::{load_config_or_default, Config};
use tracing::debug;

/// Load and validate the configuration for the current directory, falling
/// back to defaults when no file exists
pub(crate) fn load_validated_config() -> anyhow::Result<(Config, Option<PathBuf>)> {
    let cwd = std::env::current_dir()?;
    let (config, path) = load_config_or_default(&cwd);
    validate_config(&config)?;
    debug!(config_path = ?path, "loaded configuration");
    Ok((config, path))
}

/// Runtime for commands that drive async libraries
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
