//! Task record and state machine

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foreman_core::{Result, TaskError};

/// Unique identifier for a task, assigned by the store at creation
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Persisted state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Created by the submitter, not yet picked up
    Queued,
    /// Claimed by the engine, work is running
    Processing,
    /// A user asked for cancellation; observed at the next checkpoint
    Cancelling,
    /// The watchdog declared the task stalled; observed at the next checkpoint
    Timeout,
    /// Work returned normally
    Done,
    /// Work raised a fault
    Error,
    /// Work was cancelled or timed out
    Cancelled,
}

impl TaskState {
    /// Returns the string representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Cancelling => "cancelling",
            Self::Timeout => "timeout",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this state ends the task's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// Whether a checkpoint in this state must stop the work
    pub fn is_cancel_requested(&self) -> bool {
        matches!(self, Self::Cancelling | Self::Timeout)
    }

    /// Whether `next` is a forward move from this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Queued, Processing | Cancelling | Timeout | Cancelled | Error) => true,
            (Processing, Cancelling | Timeout | Done | Error | Cancelled) => true,
            (Cancelling, Timeout | Done | Error | Cancelled) => true,
            (Timeout, Done | Error | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "cancelling" => Ok(Self::Cancelling),
            "timeout" => Ok(Self::Timeout),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown task state: {}", s)),
        }
    }
}

/// Durable state of one background job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Current state
    pub state: TaskState,
    /// Human-readable description supplied by the submitter
    pub description: String,
    /// Job type that will run this task
    pub task_type: String,
    /// Deployment the task operates on, if any
    #[serde(default)]
    pub deployment_name: Option<String>,
    /// Terminal outcome payload
    #[serde(default)]
    pub result: Option<String>,
    /// Directory receiving captured logs
    output: PathBuf,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the engine claimed the task
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Last checkpoint, used by the watchdog to detect stalls
    #[serde(default)]
    pub checkpoint_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a queued task from a submission
    pub fn from_new(id: TaskId, new: NewTask, output: PathBuf) -> Self {
        Self {
            id,
            state: TaskState::Queued,
            description: new.description,
            task_type: new.task_type,
            deployment_name: new.deployment_name,
            result: None,
            output,
            created_at: Utc::now(),
            started_at: None,
            checkpoint_time: None,
        }
    }

    /// Output directory, fixed at creation
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Move to a non-terminal state, rejecting backward moves
    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                id: self.id.get(),
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.state = next;
        Ok(())
    }

    /// Record the terminal state and result. The result is written once.
    pub fn finish(&mut self, state: TaskState, result: impl Into<String>) -> Result<()> {
        if !state.is_terminal() {
            return Err(TaskError::InvalidTransition {
                id: self.id.get(),
                from: self.state.to_string(),
                to: state.to_string(),
            }
            .into());
        }
        if self.result.is_some() {
            return Err(TaskError::ResultAlreadySet(self.id.get()).into());
        }
        self.transition(state)?;
        self.result = Some(result.into());
        Ok(())
    }

    /// Most recent sign of life: the last checkpoint, or the claim time
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.checkpoint_time.or(self.started_at)
    }
}

/// A task submission, before the store assigns an id
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Human-readable description
    pub description: String,
    /// Job type that will run the task
    pub task_type: String,
    /// Deployment the task operates on
    pub deployment_name: Option<String>,
}

impl NewTask {
    /// Create a new submission
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            task_type: task_type.into(),
            deployment_name: None,
        }
    }

    /// Set the deployment name
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment_name = Some(deployment.into());
        self
    }
}
