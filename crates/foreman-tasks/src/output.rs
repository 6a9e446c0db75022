//! Per-task output capture
//!
//! Each task owns an output directory holding:
//! - `debug`: every tracing event emitted while the task's job runs
//! - `event`: one JSON line per [`TaskEvent`]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{warn, Dispatch};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use foreman_core::{ForemanError, Result};

use crate::reporter::TaskEvent;

/// File name of the per-task debug log
pub const DEBUG_LOG: &str = "debug";

/// File name of the per-task event log
pub const EVENT_LOG: &str = "event";

/// Open output of one running task
///
/// Dropping the value flushes and closes the debug log, so holding it for the
/// duration of an invocation guarantees release on every exit path.
pub struct TaskOutput {
    dir: PathBuf,
    dispatch: Dispatch,
    events: Mutex<File>,
    _guard: WorkerGuard,
}

#[derive(Serialize)]
struct EventRecord<'a> {
    time: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a TaskEvent,
}

impl TaskOutput {
    /// Open the output directory and build the task's log dispatcher
    pub fn open(dir: &Path, log_level: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(DEBUG_LOG)
            .build(dir)
            .map_err(|e| {
                ForemanError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("debug"));
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter),
        );

        let events = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENT_LOG))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            dispatch: Dispatch::new(subscriber),
            events: Mutex::new(events),
            _guard: guard,
        })
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dispatcher to install while the task's job runs
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }

    /// Append an event to the event log
    pub fn record(&self, event: &TaskEvent) {
        let record = EventRecord {
            time: Utc::now(),
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize task event");
                return;
            }
        };
        match self.events.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    warn!(dir = %self.dir.display(), error = %e, "failed to write task event");
                }
            }
            Err(_) => warn!("task event log lock poisoned"),
        }
    }
}

impl std::fmt::Debug for TaskOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOutput").field("dir", &self.dir).finish()
    }
}
