//! Configuration loading
//!
//! A config file is parsed, its relative `tasks.dir` and `blobstore.path`
//! are anchored at the file's directory, `FOREMAN_*` environment overrides
//! are applied and the result is validated.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Overrides for `tasks.dir`
pub const ENV_TASKS_DIR: &str = "FOREMAN_TASKS_DIR";
/// Overrides for `blobstore.path`
pub const ENV_BLOBSTORE_PATH: &str = "FOREMAN_BLOBSTORE_PATH";
/// Overrides for `blobstore.multidigest_path`
pub const ENV_MULTIDIGEST_PATH: &str = "FOREMAN_MULTIDIGEST_PATH";

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = parse_config(path)?;
    if let Some(base) = path.parent() {
        anchor_paths(&mut config, base);
    }
    apply_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config)?;
    debug!(
        path = %path.display(),
        tasks_dir = %config.tasks.dir.display(),
        blobstore = %config.blobstore.path.display(),
        "config loaded and validated"
    );
    Ok(config)
}

fn parse_config(path: &Path) -> Result<Config> {
    let yaml = path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml");
    info!(path = %path.display(), format = if yaml { "YAML" } else { "TOML" }, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = if yaml {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    } else {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    };
    Ok(config)
}

/// Resolve relative task and blob directories against `base`.
///
/// A `.github/` config directory anchors at the project above it. The
/// multi-digest tool is left alone when it is a bare command name, so it is
/// still looked up on `PATH`.
pub fn anchor_paths(config: &mut Config, base: &Path) {
    let base = if base.file_name().is_some_and(|n| n == ".github") {
        base.parent().unwrap_or(base)
    } else {
        base
    };

    for dir in [&mut config.tasks.dir, &mut config.blobstore.path] {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }

    let tool = &mut config.blobstore.multidigest_path;
    if tool.is_relative() && tool.components().count() > 1 {
        *tool = base.join(&*tool);
    }
}

/// Apply `FOREMAN_*` overrides, looking each variable up through `lookup`
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let targets = [
        (ENV_TASKS_DIR, &mut config.tasks.dir),
        (ENV_BLOBSTORE_PATH, &mut config.blobstore.path),
        (ENV_MULTIDIGEST_PATH, &mut config.blobstore.multidigest_path),
    ];
    for (key, target) in targets {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            debug!(key, value = %value, "config override from environment");
            *target = PathBuf::from(value);
        }
    }
}

/// Find configuration file in directory or parent directories.
///
/// At each level `<dir>/<name>` is checked before `<dir>/.github/<name>`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            for candidate in [current.join(name), current.join(".github").join(name)] {
                if candidate.exists() {
                    info!(path = %candidate.display(), "found config file");
                    return Some(candidate);
                }
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or fall back to defaults anchored at `dir`
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "no usable config found, using defaults");
            let mut config = Config::default();
            anchor_paths(&mut config, dir);
            apply_overrides(&mut config, |key| std::env::var(key).ok());
            (config, None)
        }
    }
}
