//! Task store persisted as one JSON document per task

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use foreman_core::{ForemanError, Result, TaskError};

use crate::store::{apply_claim, apply_update, TaskClaim, TaskStore};
use crate::task::{NewTask, Task, TaskId, TaskState};

const LOCK_FILE: &str = ".lock";

/// File-backed task store
///
/// Records live at `<records_dir>/<id>.json` and are replaced atomically.
/// Every read-modify-write holds an exclusive lock on `<records_dir>/.lock`,
/// so a CLI cancel and a worker's checkpoint in another process never lose
/// each other's update. The mutex serializes tasks within one process.
#[derive(Debug)]
pub struct FileTaskStore {
    records_dir: PathBuf,
    output_root: PathBuf,
    lock: Mutex<()>,
}

impl FileTaskStore {
    /// Open (creating if needed) a store rooted at the given directories
    pub fn open(records_dir: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Result<Self> {
        let records_dir = records_dir.into();
        let output_root = output_root.into();
        fs::create_dir_all(&records_dir)?;
        info!(records_dir = %records_dir.display(), "opened task store");
        Ok(Self {
            records_dir,
            output_root,
            lock: Mutex::new(()),
        })
    }

    /// Directory holding the task records
    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Run `f` holding the records directory lock
    fn exclusive<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.records_dir.join(LOCK_FILE))?;
        let mut lock = RwLock::new(file);
        let _held = lock.write()?;
        f()
    }

    fn record_path(&self, id: TaskId) -> PathBuf {
        self.records_dir.join(format!("{}.json", id))
    }

    fn read(&self, id: TaskId) -> Result<Task> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(TaskError::NotFound(id.get()).into());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, task: &Task) -> Result<()> {
        let json = serde_json::to_string_pretty(task)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.records_dir)?;
        file.write_all(json.as_bytes())?;
        file.persist(self.record_path(task.id))
            .map_err(|e| ForemanError::from(e.error))?;
        Ok(())
    }

    fn existing_ids(&self) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.records_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    ids.push(TaskId(id));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn modify<T>(&self, id: TaskId, f: impl FnOnce(&mut Task) -> Result<T>) -> Result<T> {
        self.exclusive(|| {
            let mut task = self.read(id)?;
            let out = f(&mut task)?;
            self.write(&task)?;
            Ok(out)
        })
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, new: NewTask) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let task = self.exclusive(|| {
            let next = self
                .existing_ids()?
                .last()
                .map(|id| id.get() + 1)
                .unwrap_or(1);
            let id = TaskId(next);
            let task = Task::from_new(id, new, self.output_root.join(id.to_string()));
            self.write(&task)?;
            Ok(task)
        })?;
        debug!(task_id = %task.id, "created task record");
        Ok(task)
    }

    async fn load(&self, id: TaskId) -> Result<Task> {
        let _guard = self.lock.lock().await;
        self.read(id)
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let _guard = self.lock.lock().await;
        self.existing_ids()?
            .into_iter()
            .map(|id| self.read(id))
            .collect()
    }

    async fn claim(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskClaim> {
        let _guard = self.lock.lock().await;
        self.exclusive(|| {
            let mut task = self.read(id)?;
            let claim = apply_claim(&mut task, at)?;
            if matches!(claim, TaskClaim::Claimed(_)) {
                self.write(&task)?;
            }
            Ok(claim)
        })
    }

    async fn update_state(&self, id: TaskId, state: TaskState) -> Result<Task> {
        let _guard = self.lock.lock().await;
        self.modify(id, |task| {
            apply_update(task, state)?;
            Ok(task.clone())
        })
    }

    async fn finish(&self, id: TaskId, state: TaskState, result: &str) -> Result<Task> {
        let _guard = self.lock.lock().await;
        self.modify(id, |task| {
            task.finish(state, result)?;
            Ok(task.clone())
        })
    }

    async fn checkpoint(&self, id: TaskId, at: DateTime<Utc>) -> Result<TaskState> {
        let _guard = self.lock.lock().await;
        self.modify(id, |task| {
            task.checkpoint_time = Some(at);
            Ok(task.state)
        })
    }
}
