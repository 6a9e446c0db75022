//! Output formatting utilities

use console::{style, Style};

use foreman_tasks::TaskState;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Style for a task state
pub fn state_style(state: TaskState) -> Style {
    match state {
        TaskState::Done => Style::new().green(),
        TaskState::Error => Style::new().red().bold(),
        TaskState::Cancelled | TaskState::Cancelling | TaskState::Timeout => Style::new().yellow(),
        TaskState::Processing => Style::new().cyan(),
        TaskState::Queued => Style::new().dim(),
    }
}
