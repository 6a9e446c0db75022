//! Watchdog that times out stalled tasks

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use foreman_core::Result;

use crate::store::TaskStore;
use crate::task::{TaskId, TaskState};

/// Flags processing tasks whose last activity is older than `max_idle`.
///
/// A flagged task moves to `timeout`; the job observes it at its next
/// checkpoint and the engine records it as cancelled.
pub struct TaskWatchdog {
    store: Arc<dyn TaskStore>,
    max_idle: Duration,
}

impl TaskWatchdog {
    pub fn new(store: Arc<dyn TaskStore>, max_idle: Duration) -> Self {
        Self { store, max_idle }
    }

    /// Flag stalled tasks as of `now`, returning their ids
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<TaskId>> {
        let max_idle = chrono::Duration::from_std(self.max_idle)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        let mut flagged = Vec::new();

        for task in self.store.list().await? {
            if task.state != TaskState::Processing {
                continue;
            }
            let Some(last) = task.last_activity() else {
                continue;
            };
            let idle = now.signed_duration_since(last);
            if idle <= max_idle {
                continue;
            }
            match self.store.update_state(task.id, TaskState::Timeout).await {
                Ok(_) => {
                    info!(task_id = %task.id, idle_secs = idle.num_seconds(), "task timed out");
                    flagged.push(task.id);
                }
                // The task may have finished between list and update
                Err(e) => warn!(task_id = %task.id, error = %e, "failed to time out task"),
            }
        }

        Ok(flagged)
    }
}
