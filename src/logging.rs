//! Per-agent log files plus warnings on stderr.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::error::{Error, Result};

/// Keeps the background log writer alive; logs are flushed when it drops.
#[must_use = "logging stops when the guard is dropped"]
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// Events at INFO and above (or whatever `RUST_LOG` selects) go to
/// `<logs_dir>/YYYY-MM-DD.log`, rotated daily.  WARN and above also go to
/// stderr.
pub fn init(logs_dir: &Path) -> Result<LogGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| {
            Error::io(
                format!("failed to open log directory {}", logs_dir.display()),
                std::io::Error::other(e),
            )
        })?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .with_filter(file_filter),
        )
        .with(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::WARN),
        )
        .try_init()
        .map_err(|e| {
            Error::io(
                "failed to install the log subscriber",
                std::io::Error::other(e),
            )
        })?;

    tracing::info!(path = %logs_dir.display(), "Logging initialized");
    Ok(LogGuard { _file: guard })
}
