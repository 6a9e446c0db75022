//! Task execution engine
//!
//! Turns a [`Job`] into a durably tracked background task: claims the task,
//! captures its logs, runs the job and maps the outcome to a terminal state.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use foreman_core::{ForemanError, Result, TaskError};

use crate::checkpoint::TaskCheckpoint;
use crate::job::{serialize_result, Job, JobArgs, JobContext, JobFactory, JobRegistry};
use crate::output::TaskOutput;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::store::{TaskClaim, TaskStore};
use crate::task::{Task, TaskId, TaskState};

/// Final outcome of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Task that ran
    pub task_id: TaskId,
    /// Terminal state
    pub state: TaskState,
    /// Persisted result text
    pub result: String,
}

impl TaskOutcome {
    fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            state: task.state,
            result: task.result.clone().unwrap_or_default(),
        }
    }
}

/// Task execution engine
pub struct TaskEngine {
    store: Arc<dyn TaskStore>,
    reporter: Arc<dyn TaskReporter>,
    log_level: String,
}

impl TaskEngine {
    /// Create an engine over a task store
    pub fn new(store: Arc<dyn TaskStore>, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            store,
            reporter,
            log_level: "debug".to_string(),
        }
    }

    /// Set the level filter of per-task debug logs
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Task store used by this engine
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Run a task with a job built by `factory` from `args`.
    ///
    /// Only `TaskError::NotFound` and store failures are returned as errors;
    /// every job outcome, including faults, is recorded on the task.
    pub async fn perform(
        &self,
        task_id: TaskId,
        worker: &str,
        factory: &dyn JobFactory,
        args: JobArgs,
    ) -> Result<TaskOutcome> {
        self.perform_with(task_id, worker, move |_| factory.build(args))
            .await
    }

    /// Run a task with the factory registered for its task type
    pub async fn perform_registered(
        &self,
        task_id: TaskId,
        worker: &str,
        registry: &JobRegistry,
        args: JobArgs,
    ) -> Result<TaskOutcome> {
        self.perform_with(task_id, worker, move |task| {
            registry.get(&task.task_type)?.build(args)
        })
        .await
    }

    #[instrument(skip_all, fields(task_id = %task_id, worker = %worker))]
    async fn perform_with<B>(&self, task_id: TaskId, worker: &str, build: B) -> Result<TaskOutcome>
    where
        B: FnOnce(&Task) -> Result<Box<dyn Job>> + Send,
    {
        let task = self.store.load(task_id).await?;

        let output = match TaskOutput::open(task.output(), &self.log_level) {
            Ok(output) => output,
            Err(e) => {
                error!(output = %task.output().display(), error = %e, "failed to open task output");
                if task.state.is_cancel_requested() {
                    let reason = cancellation_error(task_id, task.state).to_string();
                    self.reporter.report(&TaskEvent::Cancelled {
                        id: task_id,
                        previous: task.state,
                        reason: reason.clone(),
                    });
                    return self.finish(task_id, TaskState::Cancelled, &reason).await;
                }
                let message = format!("Failed to open task output: {}", e);
                return self.finish(task_id, TaskState::Error, &message).await;
            }
        };

        let dispatch = output.dispatch();
        let span = tracing::dispatcher::with_default(&dispatch, || {
            info_span!("task", task_id = %task_id, worker = %worker)
        });

        let outcome = self
            .run(&task, worker, build, &output)
            .instrument(span)
            .with_subscriber(dispatch)
            .await;

        // Flushes the task's debug log
        drop(output);
        outcome
    }

    async fn run<B>(
        &self,
        task: &Task,
        worker: &str,
        build: B,
        output: &TaskOutput,
    ) -> Result<TaskOutcome>
    where
        B: FnOnce(&Task) -> Result<Box<dyn Job>> + Send,
    {
        let id = task.id;

        if let TaskClaim::Preempted(previous) = self.store.claim(id, Utc::now()).await? {
            let reason = cancellation_error(id, previous).to_string();
            info!(previous = %previous, "task cancelled before it started");
            self.emit(
                output,
                TaskEvent::Cancelled {
                    id,
                    previous,
                    reason: reason.clone(),
                },
            );
            return self.finish(id, TaskState::Cancelled, &reason).await;
        }

        let start = Instant::now();
        let result = match build(task) {
            Ok(mut job) => {
                if job.job_type() != task.task_type {
                    warn!(
                        job_type = job.job_type(),
                        task_type = %task.task_type,
                        "job type does not match task type"
                    );
                }
                info!(job_type = job.job_type(), "performing job");
                self.emit(
                    output,
                    TaskEvent::Started {
                        id,
                        job_type: job.job_type().to_string(),
                        worker: worker.to_string(),
                    },
                );
                let ctx = JobContext::new(id, worker, TaskCheckpoint::new(id, self.store.clone()));
                job.perform(&ctx).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                let result = serialize_result(&value);
                info!(duration_ms, "task done");
                self.emit(
                    output,
                    TaskEvent::Completed {
                        id,
                        duration_ms,
                        result: result.clone(),
                    },
                );
                self.finish(id, TaskState::Done, &result).await
            }
            Err(e) if e.is_cancellation() => {
                let previous = match e {
                    ForemanError::Task(TaskError::TimedOut(_)) => TaskState::Timeout,
                    _ => TaskState::Cancelling,
                };
                let reason = e.to_string();
                info!(reason = %reason, "task cancelled at checkpoint");
                self.emit(
                    output,
                    TaskEvent::Cancelled {
                        id,
                        previous,
                        reason: reason.clone(),
                    },
                );
                self.finish(id, TaskState::Cancelled, &reason).await
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, duration_ms, "task failed");
                self.emit(
                    output,
                    TaskEvent::Failed {
                        id,
                        duration_ms,
                        error: message.clone(),
                    },
                );
                self.finish(id, TaskState::Error, &message).await
            }
        }
    }

    async fn finish(&self, id: TaskId, state: TaskState, result: &str) -> Result<TaskOutcome> {
        let task = self.store.finish(id, state, result).await?;
        Ok(TaskOutcome::from_task(&task))
    }

    fn emit(&self, output: &TaskOutput, event: TaskEvent) {
        output.record(&event);
        self.reporter.report(&event);
    }
}

/// Error a checkpoint would raise for a pending cancel request
fn cancellation_error(id: TaskId, state: TaskState) -> TaskError {
    match state {
        TaskState::Timeout => TaskError::TimedOut(id.get()),
        _ => TaskError::Cancelled(id.get()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FnJobFactory;
    use crate::output::{DEBUG_LOG, EVENT_LOG};
    use crate::reporter::CollectingReporter;
    use crate::store::MemoryTaskStore;
    use crate::task::NewTask;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<MemoryTaskStore>,
        reporter: Arc<CollectingReporter>,
        engine: TaskEngine,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryTaskStore::new(temp.path().join("tasks")));
        let reporter = Arc::new(CollectingReporter::default());
        let engine = TaskEngine::new(store.clone(), reporter.clone());
        Fixture {
            _temp: temp,
            store,
            reporter,
            engine,
        }
    }

    /// Job driven by a closure over its context
    struct TestJob<F>(F);

    #[async_trait]
    impl<F> Job for TestJob<F>
    where
        F: FnMut(&JobContext) -> Result<Value> + Send,
    {
        fn job_type(&self) -> &'static str {
            "test"
        }

        async fn perform(&mut self, ctx: &JobContext) -> Result<Value> {
            (self.0)(ctx)
        }
    }

    fn factory<F>(f: F) -> impl JobFactory
    where
        F: Fn(&JobContext) -> Result<Value> + Clone + Send + Sync + 'static,
    {
        FnJobFactory::new("test", move |_args| {
            Ok(Box::new(TestJob(f.clone())) as Box<dyn Job>)
        })
    }

    /// Job that checkpoints before returning
    struct CheckpointingJob;

    #[async_trait]
    impl Job for CheckpointingJob {
        fn job_type(&self) -> &'static str {
            "test"
        }

        async fn perform(&mut self, ctx: &JobContext) -> Result<Value> {
            ctx.checkpoint().await?;
            Ok(json!("finished"))
        }
    }

    async fn queued(store: &MemoryTaskStore) -> Task {
        store.create(NewTask::new("test", "test task")).await.unwrap()
    }

    #[tokio::test]
    async fn test_return_value_becomes_done_result() {
        let f = fixture();
        let task = queued(&f.store).await;

        let outcome = f
            .engine
            .perform(task.id, "workername1", &factory(|_| Ok(json!(5))), JobArgs::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Done);
        assert_eq!(outcome.result, "5");
        let task = f.store.load(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Done);
        assert_eq!(task.result.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_worker_name_reaches_job_context() {
        let f = fixture();
        let task = queued(&f.store).await;

        let outcome = f
            .engine
            .perform(
                task.id,
                "workername1",
                &factory(|ctx| Ok(json!(ctx.worker))),
                JobArgs::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.result, "workername1");
    }

    #[tokio::test]
    async fn test_arguments_are_passed_to_the_job() {
        let f = fixture();
        let task = queued(&f.store).await;
        let echo = FnJobFactory::new("test", |args: JobArgs| {
            let value = serde_json::to_value(&args)?;
            Ok(Box::new(TestJob(move |_: &JobContext| Ok(value.clone()))) as Box<dyn Job>)
        });
        let args = JobArgs::new()
            .push("a")
            .unwrap()
            .push(vec!["b"])
            .unwrap()
            .push(json!({"c": 5}))
            .unwrap();

        let outcome = f
            .engine
            .perform(task.id, "workername1", &echo, args)
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Done);
        let parsed: Value = serde_json::from_str(&outcome.result).unwrap();
        assert_eq!(parsed, json!(["a", ["b"], {"c": 5}]));
    }

    #[tokio::test]
    async fn test_fault_is_recorded_as_error() {
        let f = fixture();
        let task = queued(&f.store).await;

        let outcome = f
            .engine
            .perform(
                task.id,
                "workername1",
                &factory(|_| Err(ForemanError::other("test"))),
                JobArgs::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Error);
        let task = f.store.load(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Error);
        assert_eq!(task.result.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_construction_fault_is_recorded_as_error() {
        let f = fixture();
        let task = queued(&f.store).await;
        let broken = FnJobFactory::new("test", |args: JobArgs| {
            let name: String = args.get(0)?;
            Ok(Box::new(TestJob(move |_: &JobContext| Ok(json!(name.clone())))) as Box<dyn Job>)
        });

        let outcome = f
            .engine
            .perform(task.id, "w", &broken, JobArgs::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Error);
        assert!(outcome.result.contains("position 0"));
    }

    #[tokio::test]
    async fn test_missing_task_raises_not_found() {
        let f = fixture();
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();

        let err = f
            .engine
            .perform(
                TaskId(1),
                "workername1",
                &factory(move |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
                JobArgs::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForemanError::Task(TaskError::NotFound(1))));
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(f.store.list().await.unwrap().is_empty());
        assert!(f.reporter.events().is_empty());
    }

    #[tokio::test]
    async fn test_cancelling_task_is_cancelled_without_running() {
        for (requested, reason) in [
            (TaskState::Cancelling, "Task 1 cancelled"),
            (TaskState::Timeout, "Task 1 timed out"),
        ] {
            let f = fixture();
            let task = queued(&f.store).await;
            f.store.update_state(task.id, requested).await.unwrap();
            let invoked = Arc::new(AtomicBool::new(false));
            let flag = invoked.clone();

            let outcome = f
                .engine
                .perform(
                    task.id,
                    "workername1",
                    &factory(move |_| {
                        flag.store(true, Ordering::SeqCst);
                        Ok(Value::Null)
                    }),
                    JobArgs::new(),
                )
                .await
                .unwrap();

            assert_eq!(outcome.state, TaskState::Cancelled);
            assert_eq!(outcome.result, reason);
            assert!(!invoked.load(Ordering::SeqCst));
            assert_eq!(
                f.store.load(task.id).await.unwrap().state,
                TaskState::Cancelled
            );
        }
    }

    #[tokio::test]
    async fn test_checkpoint_observes_cancel_request() {
        let f = fixture();
        let task = queued(&f.store).await;
        let store = f.store.clone();
        let cancel_then_checkpoint = FnJobFactory::new("test", move |_args| {
            let store = store.clone();
            Ok(Box::new(CancelThenCheckpoint(store, TaskState::Cancelling)) as Box<dyn Job>)
        });

        let outcome = f
            .engine
            .perform(task.id, "w", &cancel_then_checkpoint, JobArgs::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Cancelled);
        assert_eq!(outcome.result, "Task 1 cancelled");
        assert!(matches!(
            f.reporter.events().last(),
            Some(TaskEvent::Cancelled {
                previous: TaskState::Cancelling,
                ..
            })
        ));
    }

    /// Moves its own task to the given state, then checkpoints
    struct CancelThenCheckpoint(Arc<MemoryTaskStore>, TaskState);

    #[async_trait]
    impl Job for CancelThenCheckpoint {
        fn job_type(&self) -> &'static str {
            "test"
        }

        async fn perform(&mut self, ctx: &JobContext) -> Result<Value> {
            self.0.update_state(ctx.task_id, self.1).await?;
            ctx.checkpoint().await?;
            Ok(json!("unreachable"))
        }
    }

    #[tokio::test]
    async fn test_checkpoint_observes_timeout() {
        let f = fixture();
        let task = queued(&f.store).await;
        let store = f.store.clone();
        let timeout_then_checkpoint = FnJobFactory::new("test", move |_args| {
            let store = store.clone();
            Ok(Box::new(CancelThenCheckpoint(store, TaskState::Timeout)) as Box<dyn Job>)
        });

        let outcome = f
            .engine
            .perform(task.id, "w", &timeout_then_checkpoint, JobArgs::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Cancelled);
        assert_eq!(outcome.result, "Task 1 timed out");
        assert_eq!(
            f.store.load(task.id).await.unwrap().state,
            TaskState::Cancelled
        );
        assert!(matches!(
            f.reporter.events().last(),
            Some(TaskEvent::Cancelled {
                previous: TaskState::Timeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unopenable_output_still_honours_cancel_request() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = Arc::new(MemoryTaskStore::new(blocker.clone()));
        let reporter = Arc::new(CollectingReporter::default());
        let engine = TaskEngine::new(store.clone(), reporter.clone());

        let cancelled = queued(&store).await;
        store
            .update_state(cancelled.id, TaskState::Cancelling)
            .await
            .unwrap();
        let outcome = engine
            .perform(cancelled.id, "w", &factory(|_| Ok(Value::Null)), JobArgs::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, TaskState::Cancelled);
        assert_eq!(outcome.result, format!("Task {} cancelled", cancelled.id));

        let plain = queued(&store).await;
        let outcome = engine
            .perform(plain.id, "w", &factory(|_| Ok(Value::Null)), JobArgs::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, TaskState::Error);
        assert!(outcome.result.starts_with("Failed to open task output"));
    }

    #[tokio::test]
    async fn test_checkpoint_passes_while_processing() {
        let f = fixture();
        let task = queued(&f.store).await;
        let factory = FnJobFactory::new("test", |_args| {
            Ok(Box::new(CheckpointingJob) as Box<dyn Job>)
        });

        let outcome = f.engine.perform(task.id, "w", &factory, JobArgs::new()).await.unwrap();

        assert_eq!(outcome.state, TaskState::Done);
        assert_eq!(outcome.result, "finished");
        assert!(f.store.load(task.id).await.unwrap().checkpoint_time.is_some());
    }

    #[tokio::test]
    async fn test_job_logs_are_captured_in_task_output() {
        let f = fixture();
        let task = queued(&f.store).await;

        f.engine
            .perform(
                task.id,
                "workername1",
                &factory(|_| {
                    tracing::info!("creating errand vms");
                    Ok(Value::Null)
                }),
                JobArgs::new(),
            )
            .await
            .unwrap();

        let debug = std::fs::read_to_string(task.output().join(DEBUG_LOG)).unwrap();
        assert!(debug.contains("creating errand vms"));
        assert!(debug.contains("workername1"));

        let events = std::fs::read_to_string(task.output().join(EVENT_LOG)).unwrap();
        assert_eq!(events.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_registered_job_resolves_by_task_type() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut registry = JobRegistry::new();
        registry.register(factory(move |ctx| {
            record.lock().unwrap().push(ctx.task_id);
            Ok(json!("ran"))
        }));

        let task = queued(&f.store).await;
        let outcome = f
            .engine
            .perform_registered(task.id, "w", &registry, JobArgs::new())
            .await
            .unwrap();
        assert_eq!(outcome.result, "ran");
        assert_eq!(*seen.lock().unwrap(), vec![task.id]);

        let unknown = f
            .store
            .create(NewTask::new("mystery", "unknown job"))
            .await
            .unwrap();
        let outcome = f
            .engine
            .perform_registered(unknown.id, "w", &registry, JobArgs::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, TaskState::Error);
        assert_eq!(outcome.result, "Unknown job type: mystery");
    }
}
