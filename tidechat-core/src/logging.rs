//! Logging for tidechat
//!
//! Both binaries log to a daily-rolling file under `$XDG_STATE_HOME/tidechat/`.
//! The terminal UI owns stdout and the CLI prints the answer there, so
//! nothing is ever logged to the terminal.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used by the test writer when RUST_LOG is unset
const TEST_FILTER: &str = "tidechat_core=debug";

/// Build the level filter. RUST_LOG wins over the configured level.
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the file subscriber
///
/// Keeps `max_files` daily files in the state directory. The returned guard
/// flushes pending lines when dropped, so hold it until exit.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tidechat.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {}", e)))?;
    let (writer, worker) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter_for(&config.level))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(log_dir = %log_dir.display(), level = %config.level, "Logging initialized");

    Ok(LoggingGuard {
        log_dir,
        _worker: worker,
    })
}

/// Route core logs to the test writer; safe to call from every test
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(TEST_FILTER))
        .with_test_writer()
        .with_target(false)
        .try_init();
}

/// Keeps the background log writer alive
pub struct LoggingGuard {
    log_dir: PathBuf,
    _worker: tracing_appender::non_blocking::WorkerGuard,
}

impl LoggingGuard {
    /// Directory holding the rolling log files
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}
