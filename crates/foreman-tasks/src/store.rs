//! Task store interface and in-memory implementation

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use foreman_core::{Result, TaskError};

use crate::task::{NewTask, Task, TaskId, TaskState};

/// Outcome of claiming a task for execution
#[derive(Debug, Clone, PartialEq)]
pub enum TaskClaim {
    /// The task moved to `processing` and may run
    Claimed(Task),
    /// A cancel or timeout was requested before the task started.
    /// The task was left untouched and must not run.
    Preempted(TaskState),
}

/// Persisted task records
///
/// Implementations must make `claim` a single atomic read-decide-write so a
/// cancellation requested before work starts is never missed.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a queued task with a fresh id
    async fn create(&self, new: NewTask) -> Result<Task>;

    /// Load a task by id. Fails with `TaskError::NotFound` if absent.
    async fn load(&self, id: TaskId) -> Result<Task>;

    /// List all tasks ordered by id
    async fn list(&self) -> Result<Vec<Task>>;

    /// Claim a task for execution
    async fn claim(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskClaim>;

    /// Move a task to a non-terminal state (cancel or timeout requests)
    async fn update_state(&self, id: TaskId, state: TaskState) -> Result<Task>;

    /// Record the terminal state and result
    async fn finish(&self, id: TaskId, state: TaskState, result: &str) -> Result<Task>;

    /// Refresh the checkpoint time and return the current state
    async fn checkpoint(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskState>;
}

/// Shared claim logic for store implementations
pub(crate) fn apply_claim(task: &mut Task, at: DateTime<Utc>) -> Result<TaskClaim> {
    if task.state.is_cancel_requested() {
        return Ok(TaskClaim::Preempted(task.state));
    }
    task.transition(TaskState::Processing)?;
    task.started_at = Some(at);
    Ok(TaskClaim::Claimed(task.clone()))
}

/// Shared non-terminal update logic for store implementations
pub(crate) fn apply_update(task: &mut Task, state: TaskState) -> Result<()> {
    if state.is_terminal() {
        // Terminal states carry a result and go through `finish`
        return Err(TaskError::InvalidTransition {
            id: task.id.get(),
            from: task.state.to_string(),
            to: state.to_string(),
        }
        .into());
    }
    task.transition(state)
}

/// Task store kept in memory, for tests and single-process runs
#[derive(Debug)]
pub struct MemoryTaskStore {
    output_root: PathBuf,
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    tasks: BTreeMap<TaskId, Task>,
}

impl MemoryTaskStore {
    /// Create a store whose tasks write output under `output_root/<id>`
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            inner: Mutex::new(MemoryInner {
                next_id: 1,
                tasks: BTreeMap::new(),
            }),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, new: NewTask) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let id = TaskId(inner.next_id);
        inner.next_id += 1;
        let task = Task::from_new(id, new, self.output_root.join(id.to_string()));
        debug!(task_id = %id, task_type = %task.task_type, "created task");
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn load(&self, id: TaskId) -> Result<Task> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.get()).into())
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.values().cloned().collect())
    }

    async fn claim(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskClaim> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(TaskError::NotFound(id.get()))?;
        apply_claim(task, at)
    }

    async fn update_state(&self, id: TaskId, state: TaskState) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(TaskError::NotFound(id.get()))?;
        apply_update(task, state)?;
        Ok(task.clone())
    }

    async fn finish(&self, id: TaskId, state: TaskState, result: &str) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(TaskError::NotFound(id.get()))?;
        task.finish(state, result)?;
        Ok(task.clone())
    }

    async fn checkpoint(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskState> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(TaskError::NotFound(id.get()))?;
        task.checkpoint_time = Some(at);
        Ok(task.state)
    }
}
