//! Cooperative cancellation checkpoint

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use foreman_core::{Result, TaskError};

use crate::store::TaskStore;
use crate::task::{TaskId, TaskState};

/// Handle that running work polls to observe cancellation
///
/// Cheap to clone, so collaborators deep inside a job (instance updaters,
/// errand runners) can hold their own copy.
#[derive(Clone)]
pub struct TaskCheckpoint {
    task_id: TaskId,
    store: Arc<dyn TaskStore>,
}

impl TaskCheckpoint {
    /// Create a checkpoint for a task
    pub fn new(task_id: TaskId, store: Arc<dyn TaskStore>) -> Self {
        Self { task_id, store }
    }

    /// Task this checkpoint belongs to
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Refresh the checkpoint time and fail if cancellation was requested.
    ///
    /// Returns `TaskError::Cancelled` for a user cancel and
    /// `TaskError::TimedOut` for a watchdog timeout.
    pub async fn check(&self) -> Result<()> {
        let state = self.store.checkpoint(self.task_id, Utc::now()).await?;
        debug!(task_id = %self.task_id, state = %state, "task checkpoint");
        match state {
            TaskState::Cancelling => Err(TaskError::Cancelled(self.task_id.get()).into()),
            TaskState::Timeout => Err(TaskError::TimedOut(self.task_id.get()).into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for TaskCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCheckpoint")
            .field("task_id", &self.task_id)
            .finish()
    }
}
