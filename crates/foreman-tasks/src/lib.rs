//! Foreman Tasks - Durable background task engine
//!
//! Tasks are persisted records that move through a forward-only state
//! machine. The engine claims a task, runs its job with logs captured to the
//! task's output directory and records the outcome as a terminal state.

pub mod checkpoint;
pub mod dispatcher;
pub mod engine;
pub mod file_store;
pub mod job;
pub mod output;
pub mod reporter;
pub mod store;
pub mod task;
pub mod watchdog;

pub use checkpoint::TaskCheckpoint;
pub use dispatcher::{DispatchOptions, Submission, TaskDispatcher};
pub use engine::{TaskEngine, TaskOutcome};
pub use file_store::FileTaskStore;
pub use job::{serialize_result, FnJobFactory, Job, JobArgs, JobContext, JobFactory, JobRegistry};
pub use output::{TaskOutput, DEBUG_LOG, EVENT_LOG};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TracingReporter};
pub use store::{MemoryTaskStore, TaskClaim, TaskStore};
pub use task::{NewTask, Task, TaskId, TaskState};
pub use watchdog::TaskWatchdog;
