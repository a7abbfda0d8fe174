//! Tracing setup: stderr plus a daily-rotated log file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;
use crate::error::{self, ConfigError};

/// Build the rotating file appender described by `config`.
///
/// Files are named `<prefix>.<YYYY-MM-DD>`; only the newest `max_files` are
/// kept.
pub fn file_appender(config: &LogConfig) -> Result<RollingFileAppender, ConfigError> {
    std::fs::create_dir_all(&config.dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .max_log_files(config.max_files)
        .build(&config.dir)
        .map_err(|e| ConfigError::InvalidValue {
            key: "log_dir".to_string(),
            message: e.to_string(),
        })
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Keep the returned guard alive for the life of the process; log
/// lines still buffered are flushed when it drops.
pub fn init(config: &LogConfig) -> error::Result<WorkerGuard> {
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(config)?);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| ConfigError::ParseError(format!("tracing subscriber: {e}")))?;

    Ok(guard)
}
