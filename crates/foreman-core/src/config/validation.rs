//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_blobstore(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.max_concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            field: "tasks.max_concurrency".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.tasks.log_level.as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "tasks.log_level".to_string(),
            message: format!("must be one of: {}", valid_levels.join(", ")),
        }
        .into());
    }

    Ok(())
}

fn validate_blobstore(config: &Config) -> Result<()> {
    let valid_providers = ["local"];
    if !valid_providers.contains(&config.blobstore.provider.as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "blobstore.provider".to_string(),
            message: format!("must be one of: {}", valid_providers.join(", ")),
        }
        .into());
    }

    if config.blobstore.multidigest_path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "blobstore.multidigest_path".to_string(),
            message: "path cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}
