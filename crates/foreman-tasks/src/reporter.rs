//! Task execution reporting

use std::sync::Mutex;

use serde::Serialize;

use crate::task::{TaskId, TaskState};

/// Events emitted by the engine while it runs a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The task was claimed and its job is starting
    Started {
        id: TaskId,
        job_type: String,
        worker: String,
    },
    /// The job returned normally
    Completed {
        id: TaskId,
        duration_ms: u64,
        result: String,
    },
    /// The job raised a fault
    Failed {
        id: TaskId,
        duration_ms: u64,
        error: String,
    },
    /// The task was cancelled, either before starting or at a checkpoint
    Cancelled {
        id: TaskId,
        previous: TaskState,
        reason: String,
    },
}

impl TaskEvent {
    /// Task this event belongs to
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Started { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id, .. } => *id,
        }
    }
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started {
                id,
                job_type,
                worker,
            } => {
                tracing::info!("Task {} started: {} on {}", id, job_type, worker);
            }
            TaskEvent::Completed {
                id, duration_ms, ..
            } => {
                tracing::info!(
                    "Task {} done in {:.1}s",
                    id,
                    *duration_ms as f64 / 1000.0
                );
            }
            TaskEvent::Failed {
                id,
                duration_ms,
                error,
            } => {
                tracing::error!(
                    "Task {} failed after {:.1}s: {}",
                    id,
                    *duration_ms as f64 / 1000.0,
                    error
                );
            }
            TaskEvent::Cancelled {
                id,
                previous,
                reason,
            } => {
                tracing::warn!("Task {} cancelled while {}: {}", id, previous, reason);
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
