//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for Foreman
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Director name, used in log output
    pub name: Option<String>,

    /// Task engine configuration
    pub tasks: TasksConfig,

    /// Blobstore configuration
    pub blobstore: BlobstoreConfig,
}

/// Task engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Directory holding task records and task output
    pub dir: PathBuf,

    /// Maximum number of tasks executing at once
    pub max_concurrency: usize,

    /// Seconds without a checkpoint before a processing task is timed out.
    /// Zero disables the watchdog.
    pub stall_timeout_secs: u64,

    /// Level filter for the per-task debug log
    pub log_level: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".foreman/tasks"),
            max_concurrency: 4,
            stall_timeout_secs: 3600,
            log_level: "debug".to_string(),
        }
    }
}

impl TasksConfig {
    /// Directory holding one JSON document per task
    pub fn records_dir(&self) -> PathBuf {
        self.dir.join("records")
    }

    /// Root directory for per-task output
    pub fn output_dir(&self) -> PathBuf {
        self.dir.join("output")
    }
}

/// Blobstore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobstoreConfig {
    /// Blobstore provider (only "local" is built in)
    pub provider: String,

    /// Root directory for the local provider
    pub path: PathBuf,

    /// Path to the multi-digest verification tool
    pub multidigest_path: PathBuf,
}

impl Default for BlobstoreConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            path: PathBuf::from(".foreman/blobstore"),
            multidigest_path: PathBuf::from("verify-multidigest"),
        }
    }
}
