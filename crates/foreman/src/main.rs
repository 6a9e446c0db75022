//! Foreman - deployment director task and errand CLI

mod cli;
mod exit_codes;

use std::path::PathBuf;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

/// Console filter directive, preferred over `RUST_LOG`
const ENV_LOG: &str = "FOREMAN_LOG";
/// Directory for the JSON director log
const ENV_LOG_DIR: &str = "FOREMAN_LOG_DIR";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.quiet);
    cli.execute()
}

/// Console logging goes to stderr, filtered by `FOREMAN_LOG` or `RUST_LOG`
/// (`warn` by default, `error` with `--quiet`). Everything at debug level is
/// also written as JSON to a daily file in the log directory, when one is
/// available.
fn init_tracing(quiet: bool) -> Option<WorkerGuard> {
    let directive = console_directive(quiet, |key| std::env::var(key).ok());
    let console_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_directory() {
        Some(log_dir) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "director.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}

fn console_directive(quiet: bool, lookup: impl Fn(&str) -> Option<String>) -> String {
    [ENV_LOG, "RUST_LOG"]
        .into_iter()
        .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| (if quiet { "error" } else { "warn" }).to_string())
}

/// Log directory, created if needed
fn log_directory() -> Option<PathBuf> {
    let log_dir = match std::env::var_os(ENV_LOG_DIR) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()?.join(".foreman").join("logs"),
    };
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
