//! Units of work run by the task engine

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use foreman_core::{Result, TaskError};

use crate::checkpoint::TaskCheckpoint;
use crate::task::TaskId;

/// Context handed to a job while it runs
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Task being executed
    pub task_id: TaskId,
    /// Worker executing the task
    pub worker: String,
    checkpoint: TaskCheckpoint,
}

impl JobContext {
    /// Create a job context
    pub fn new(task_id: TaskId, worker: impl Into<String>, checkpoint: TaskCheckpoint) -> Self {
        Self {
            task_id,
            worker: worker.into(),
            checkpoint,
        }
    }

    /// Poll for cancellation, see [`TaskCheckpoint::check`]
    pub async fn checkpoint(&self) -> Result<()> {
        self.checkpoint.check().await
    }

    /// Checkpoint handle to pass to collaborators
    pub fn checkpoint_handle(&self) -> TaskCheckpoint {
        self.checkpoint.clone()
    }
}

/// A unit of work the engine can run as a task
#[async_trait]
pub trait Job: Send {
    /// Job type name, recorded on the task
    fn job_type(&self) -> &'static str;

    /// Run the job. The returned value becomes the task result.
    async fn perform(&mut self, ctx: &JobContext) -> Result<Value>;
}

/// Ordered constructor arguments forwarded to a job factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobArgs(Vec<Value>);

impl JobArgs {
    /// Create an empty argument bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument
    pub fn push(mut self, value: impl Serialize) -> Result<Self> {
        self.0.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw argument values in order
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Deserialize the argument at `index`
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.0.get(index).ok_or_else(|| TaskError::InvalidArgument {
            index,
            message: format!("expected at least {} arguments, got {}", index + 1, self.0.len()),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TaskError::InvalidArgument {
                index,
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl From<Vec<Value>> for JobArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Builds jobs from argument bundles
pub trait JobFactory: Send + Sync {
    /// Job type produced by this factory
    fn job_type(&self) -> &'static str;

    /// Construct a job
    fn build(&self, args: JobArgs) -> Result<Box<dyn Job>>;
}

/// Factory backed by a closure
pub struct FnJobFactory<F> {
    job_type: &'static str,
    build: F,
}

impl<F> FnJobFactory<F>
where
    F: Fn(JobArgs) -> Result<Box<dyn Job>> + Send + Sync,
{
    /// Create a factory from a closure
    pub fn new(job_type: &'static str, build: F) -> Self {
        Self { job_type, build }
    }
}

impl<F> JobFactory for FnJobFactory<F>
where
    F: Fn(JobArgs) -> Result<Box<dyn Job>> + Send + Sync,
{
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    fn build(&self, args: JobArgs) -> Result<Box<dyn Job>> {
        (self.build)(args)
    }
}

/// Registry of job factories keyed by job type
#[derive(Default, Clone)]
pub struct JobRegistry {
    factories: HashMap<&'static str, Arc<dyn JobFactory>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its job type
    pub fn register<F: JobFactory + 'static>(&mut self, factory: F) {
        self.factories.insert(factory.job_type(), Arc::new(factory));
    }

    /// Look up a factory
    pub fn get(&self, job_type: &str) -> Result<Arc<dyn JobFactory>> {
        self.factories
            .get(job_type)
            .cloned()
            .ok_or_else(|| TaskError::UnknownJobType(job_type.to_string()).into())
    }

    /// Registered job types, sorted
    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

/// Convert a job's return value into the persisted result text
///
/// Strings are stored as-is, `null` as the empty string and everything else
/// as compact JSON.
pub fn serialize_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
