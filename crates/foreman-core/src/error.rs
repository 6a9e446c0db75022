//! Error types for Foreman

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ForemanError
pub type Result<T> = std::result::Result<T, ForemanError>;

/// Main error type for Foreman operations
#[derive(Debug, Error)]
pub enum ForemanError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task lifecycle errors
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Errand orchestration errors
    #[error(transparent)]
    Errand(#[from] ErrandError),

    /// Blobstore errors
    #[error(transparent)]
    Blobstore(#[from] BlobstoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl ForemanError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error is a cooperative cancellation signal raised by a
    /// task checkpoint (user cancel or watchdog timeout)
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Task(TaskError::Cancelled(_)) | Self::Task(TaskError::TimedOut(_))
        )
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Task lifecycle errors
///
/// Task ids are carried as raw integers so this crate stays independent of
/// the task record types.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task id does not resolve to a record
    #[error("Task {0} not found")]
    NotFound(u64),

    /// A checkpoint observed a user cancellation request
    #[error("Task {0} cancelled")]
    Cancelled(u64),

    /// A checkpoint observed a watchdog timeout
    #[error("Task {0} timed out")]
    TimedOut(u64),

    /// The requested state change is not a forward transition
    #[error("Task {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition { id: u64, from: String, to: String },

    /// The terminal result was already recorded
    #[error("Task {0} already has a result")]
    ResultAlreadySet(u64),

    /// No job factory is registered for a job type
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// A job argument is missing or has the wrong shape
    #[error("Invalid job argument at position {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    /// Failure in the persisted task store
    #[error("Task store error: {0}")]
    Store(String),
}

/// Errand orchestration errors
#[derive(Debug, Error)]
pub enum ErrandError {
    /// The instance group cannot run errands
    #[error("Instance group '{0}' is not an errand")]
    NotAnErrand(String),

    /// The agent reported a result that could not be interpreted
    #[error("Invalid errand result from agent: {0}")]
    InvalidAgentResponse(String),
}

/// Blobstore errors
#[derive(Debug, Error)]
pub enum BlobstoreError {
    /// Downloaded content does not match the expected digest
    #[error("sha1 mismatch expected={expected}, error: {error}")]
    DigestMismatch { expected: String, error: String },

    /// The caller supplied malformed options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested blob does not exist
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The digest verification tool could not be run
    #[error("Failed to run digest verifier '{command}': {reason}")]
    VerifierFailed { command: String, reason: String },

    /// IO error
    #[error("Blobstore IO error: {0}")]
    Io(#[from] std::io::Error),
}
