//! Logging infrastructure for pagebeacon
//!
//! Two sinks, chosen independently:
//! - a daily rolling file at `~/.local/state/pagebeacon/pagebeacon.log`
//! - a stderr stream for the tracker's debug mode, showing each enqueued
//!   payload and each endpoint acknowledgment as it happens

use crate::config::{Config, LoggingConfig};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Which log sinks to install
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSinks {
    /// Write to the XDG state directory, filtered by `logging.level` or `RUST_LOG`
    pub file: bool,
    /// Mirror the collector's own info-level events to stderr
    pub debug: bool,
}

/// Initialize the logging system
///
/// The debug sink ignores `RUST_LOG` so that debug mode always shows the
/// payload trail.
pub fn init(config: &LoggingConfig, sinks: LogSinks) -> crate::error::Result<LoggingGuard> {
    let mut guard = None;

    let file_layer = if sinks.file {
        let log_dir = Config::state_dir();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "pagebeacon.log");
        let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker);

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter),
        )
    } else {
        None
    };

    let debug_layer = sinks.debug.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false)
            .with_filter(Targets::new().with_target("pagebeacon_core", Level::INFO))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(debug_layer)
        .init();

    tracing::debug!(
        file = sinks.file,
        debug = sinks.debug,
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps the file writer alive; dropping it flushes pending writes
pub struct LoggingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path();
        assert!(path.ends_with("pagebeacon.log"));
    }

    #[test]
    fn test_no_sinks_by_default() {
        let sinks = LogSinks::default();
        assert!(!sinks.file);
        assert!(!sinks.debug);
    }
}
