//! Task dispatcher: runs queued tasks on a bounded pool of tokio workers

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};

use foreman_core::Result;

use crate::engine::{TaskEngine, TaskOutcome};
use crate::job::{JobArgs, JobRegistry};
use crate::task::{TaskId, TaskState};

/// Options for the task dispatcher
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum concurrent tasks
    pub concurrency: usize,
    /// Prefix of worker names, suffixed with the worker slot
    pub worker_prefix: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
            worker_prefix: "worker".to_string(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// One task to run, with the arguments for its job
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: TaskId,
    pub args: JobArgs,
}

impl Submission {
    pub fn new(task_id: TaskId, args: JobArgs) -> Self {
        Self { task_id, args }
    }
}

/// Dispatches tasks to the engine with bounded parallelism
pub struct TaskDispatcher {
    options: DispatchOptions,
    engine: Arc<TaskEngine>,
    registry: Arc<JobRegistry>,
}

impl TaskDispatcher {
    /// Create a new dispatcher
    pub fn new(options: DispatchOptions, engine: Arc<TaskEngine>, registry: Arc<JobRegistry>) -> Self {
        Self {
            options,
            engine,
            registry,
        }
    }

    /// Run every submission and collect outcomes in submission order
    pub async fn run_all(&self, submissions: Vec<Submission>) -> Vec<Result<TaskOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(submissions.len());

        for (slot, submission) in submissions.into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = format!(
                "{}-{}",
                self.options.worker_prefix,
                slot % self.options.concurrency.max(1)
            );
            let engine = self.engine.clone();
            let registry = self.registry.clone();
            let task_id = submission.task_id;

            let handle = tokio::spawn(async move {
                let outcome = engine
                    .perform_registered(task_id, &worker, &registry, submission.args)
                    .await;
                drop(permit);
                outcome
            });
            handles.push((task_id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (task_id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "task worker panicked");
                    let message = format!("Task panicked: {}", e);
                    let finished = self
                        .engine
                        .store()
                        .finish(task_id, TaskState::Error, &message)
                        .await
                        .map(|task| TaskOutcome {
                            task_id,
                            state: task.state,
                            result: task.result.unwrap_or_default(),
                        });
                    outcomes.push(finished);
                }
            }
        }

        let done = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(o) if o.state == TaskState::Done))
            .count();
        info!(total = outcomes.len(), done, "dispatch finished");
        outcomes
    }
}
