//! Logging configuration for the Electrum SPV client.
//!
//! Console logging by default, with optional file output. Embedders that
//! install their own `tracing` subscriber can skip this module entirely.

use std::fs::{self, File};
use std::path::PathBuf;

use chrono::Local;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LoggingError, LoggingResult};

/// Prefix for archived log files.
const LOG_FILE_PREFIX: &str = "electrum-spv.";

/// Guard that must be kept alive to ensure log flushing on shutdown.
#[derive(Debug)]
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Configuration for logging output.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter. If None, falls back to `RUST_LOG` or INFO.
    pub level: Option<LevelFilter>,
    /// Whether to output logs to console (stderr).
    pub console: bool,
    /// Optional file logging configuration.
    pub file: Option<LogFileConfig>,
}

/// Configuration for log file output.
#[derive(Debug, Clone)]
pub struct LogFileConfig {
    /// Directory where log files will be stored.
    pub log_dir: PathBuf,
    /// Maximum number of log files to keep.
    pub max_files: usize,
}

/// Initialize console-only logging with the given level.
pub fn init_console_logging(level: LevelFilter) -> LoggingResult<LoggingGuard> {
    init_logging(LoggingConfig {
        level: Some(level),
        console: true,
        file: None,
    })
}

/// Initialize logging with the given configuration.
///
/// Returns a `LoggingGuard` that must be kept alive for the duration of
/// the application; dropping it flushes buffered entries. With neither
/// console nor file output enabled, tracing macros become no-ops.
pub fn init_logging(config: LoggingConfig) -> LoggingResult<LoggingGuard> {
    if !config.console && config.file.is_none() {
        return Ok(LoggingGuard {
            _worker_guard: None,
        });
    }

    let env_filter = match config.level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string())),
    };

    let (file_layer, guard) = if let Some(ref file_config) = config.file {
        let (non_blocking, guard) = setup_file_logging(file_config)?;
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(false)
            .with_writer(non_blocking);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let console_layer =
        config.console.then(|| fmt::layer().with_target(true).with_thread_ids(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInit(e.to_string()))?;

    Ok(LoggingGuard {
        _worker_guard: guard,
    })
}

/// Create the log directory, open a fresh timestamped file, and drop the
/// oldest archives beyond `max_files`.
fn setup_file_logging(config: &LogFileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.log_dir)?;

    let name = format!("{}{}.log", LOG_FILE_PREFIX, Local::now().format("%Y%m%d-%H%M%S"));
    let file = File::create(config.log_dir.join(&name))?;

    cleanup_old_logs(config)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    Ok((non_blocking, guard))
}

fn cleanup_old_logs(config: &LogFileConfig) -> LoggingResult<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(&config.log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .collect();

    if logs.len() <= config.max_files {
        return Ok(());
    }

    // Names embed the creation timestamp, so lexical order is age order.
    logs.sort();
    let excess = logs.len() - config.max_files;
    for path in logs.into_iter().take(excess) {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove old log file");
        }
    }
    Ok(())
}
