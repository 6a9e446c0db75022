//! Task inspection and control commands

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use foreman_core::Config;
use foreman_tasks::{
    FileTaskStore, Task, TaskId, TaskState, TaskStore, TaskWatchdog, DEBUG_LOG,
};

use super::{load_validated_config, runtime};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Inspect and control background tasks
#[derive(Debug, Args)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub action: TaskAction,
}

/// Task subcommands
#[derive(Debug, Subcommand)]
pub enum TaskAction {
    /// List tasks
    List(TaskListCommand),
    /// Show one task
    Show(TaskShowCommand),
    /// Request cancellation of a task
    Cancel(TaskCancelCommand),
    /// Time out processing tasks that stopped checkpointing
    Sweep(TaskSweepCommand),
}

/// List tasks
#[derive(Debug, Args)]
pub struct TaskListCommand {
    /// Only show tasks in this state
    #[arg(long)]
    pub state: Option<TaskState>,

    /// Only show the most recent N tasks
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Show one task
#[derive(Debug, Args)]
pub struct TaskShowCommand {
    /// Task id
    pub id: u64,

    /// Print the task's debug log
    #[arg(long)]
    pub debug: bool,
}

/// Request cancellation of a task
#[derive(Debug, Args)]
pub struct TaskCancelCommand {
    /// Task id
    pub id: u64,
}

/// Time out stalled tasks
#[derive(Debug, Args)]
pub struct TaskSweepCommand {
    /// Override tasks.stall_timeout_secs
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl TaskCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, _) = load_validated_config()?;
        let store = open_store(&config)?;
        let rt = runtime()?;

        match &self.action {
            TaskAction::List(cmd) => rt.block_on(cmd.execute(cli, &store)),
            TaskAction::Show(cmd) => rt.block_on(cmd.execute(cli, &store)),
            TaskAction::Cancel(cmd) => rt.block_on(cmd.execute(cli, &store)),
            TaskAction::Sweep(cmd) => rt.block_on(cmd.execute(cli, &config, store)),
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<FileTaskStore> {
    Ok(FileTaskStore::open(
        config.tasks.records_dir(),
        config.tasks.output_dir(),
    )?)
}

impl TaskListCommand {
    async fn execute(&self, cli: &Cli, store: &FileTaskStore) -> anyhow::Result<()> {
        info!(state = ?self.state, limit = ?self.limit, "executing task list command");
        let mut tasks: Vec<Task> = store
            .list()
            .await?
            .into_iter()
            .filter(|t| self.state.map_or(true, |s| t.state == s))
            .collect();
        if let Some(limit) = self.limit {
            let skip = tasks.len().saturating_sub(limit);
            tasks.drain(..skip);
        }

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            }
            OutputFormat::Text => {
                if tasks.is_empty() {
                    if !cli.quiet {
                        output::info("No tasks");
                    }
                    return Ok(());
                }
                println!(
                    "{:>6}  {:<11}  {:<12}  {}",
                    style("ID").bold(),
                    style("STATE").bold(),
                    style("TYPE").bold(),
                    style("DESCRIPTION").bold()
                );
                for task in &tasks {
                    println!(
                        "{:>6}  {:<11}  {:<12}  {}",
                        task.id.get(),
                        output::state_style(task.state).apply_to(task.state),
                        task.task_type,
                        task.description
                    );
                }
            }
        }
        Ok(())
    }
}

impl TaskShowCommand {
    async fn execute(&self, cli: &Cli, store: &FileTaskStore) -> anyhow::Result<()> {
        info!(id = self.id, "executing task show command");
        let task = store.load(TaskId(self.id)).await?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            OutputFormat::Text => {
                println!("{}", style(format!("Task {}", task.id)).bold());
                println!(
                    "{}",
                    output::key_value(
                        "State",
                        &output::state_style(task.state)
                            .apply_to(task.state)
                            .to_string()
                    )
                );
                println!("{}", output::key_value("Type", &task.task_type));
                println!("{}", output::key_value("Description", &task.description));
                if let Some(deployment) = &task.deployment_name {
                    println!("{}", output::key_value("Deployment", deployment));
                }
                println!("{}", output::key_value("Created", &task.created_at.to_rfc3339()));
                if let Some(started) = task.started_at {
                    println!("{}", output::key_value("Started", &started.to_rfc3339()));
                }
                if let Some(checkpoint) = task.checkpoint_time {
                    println!("{}", output::key_value("Checkpoint", &checkpoint.to_rfc3339()));
                }
                if let Some(result) = &task.result {
                    println!("{}", output::key_value("Result", result));
                }
                println!(
                    "{}",
                    output::key_value(
                        "Output",
                        &output::path_style()
                            .apply_to(task.output().display())
                            .to_string()
                    )
                );

                if self.debug {
                    let log = task.output().join(DEBUG_LOG);
                    println!();
                    match std::fs::read_to_string(&log) {
                        Ok(contents) => print!("{}", contents),
                        Err(e) => output::error(&format!("Cannot read {}: {}", log.display(), e)),
                    }
                }
            }
        }
        Ok(())
    }
}

impl TaskCancelCommand {
    async fn execute(&self, cli: &Cli, store: &FileTaskStore) -> anyhow::Result<()> {
        info!(id = self.id, "executing task cancel command");
        let id = TaskId(self.id);
        let task = store.load(id).await?;

        if task.state.is_terminal() || task.state.is_cancel_requested() {
            anyhow::bail!("Task {} is already {}", id, task.state);
        }

        let task = store.update_state(id, TaskState::Cancelling).await?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!("Task {} is {}", id, task.state));
                }
            }
        }
        Ok(())
    }
}

impl TaskSweepCommand {
    async fn execute(&self, cli: &Cli, config: &Config, store: FileTaskStore) -> anyhow::Result<()> {
        let secs = self.timeout_secs.unwrap_or(config.tasks.stall_timeout_secs);
        info!(timeout_secs = secs, "executing task sweep command");
        if secs == 0 {
            if !cli.quiet {
                output::info("Stall timeout is disabled");
            }
            return Ok(());
        }

        let watchdog = TaskWatchdog::new(Arc::new(store), Duration::from_secs(secs));
        let flagged = watchdog.sweep(Utc::now()).await?;

        match cli.format {
            OutputFormat::Json => {
                let ids: Vec<u64> = flagged.iter().map(|id| id.get()).collect();
                println!("{}", serde_json::json!({ "timed_out": ids }));
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    if flagged.is_empty() {
                        output::info("No stalled tasks");
                    }
                    for id in &flagged {
                        output::success(&format!("Task {} timed out", id));
                    }
                }
            }
        }
        Ok(())
    }
}
