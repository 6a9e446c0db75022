//! Foreman Core - shared foundations for the Foreman director
//!
//! This crate provides the error taxonomy and configuration system used by
//! the task engine, the errand orchestration and the blobstore clients.

pub mod config;
pub mod error;

pub use config::{load_config, load_config_from_dir, load_config_or_default, Config};
pub use error::{
    BlobstoreError, ConfigError, ErrandError, ForemanError, Result, TaskError,
};
