//! Tracing subscriber setup.
//!
//! Console output always; with `logging.file = true` records are also
//! written to a daily-rolling file (`fitcoach.log.YYYY-MM-DD`) in the logs
//! directory. `RUST_LOG` overrides the configured filter.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{CoachError, Result};

/// Prefix of rolling log file names.
pub const LOG_FILE_PREFIX: &str = "fitcoach.log";

/// Maximum age (in days) of log files to keep.
pub const MAX_LOG_AGE_DAYS: u64 = 7;

/// Maximum number of log files to keep.
pub const MAX_LOG_FILES: usize = 10;

/// Keeps the file writer alive; dropping it flushes pending records.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LogGuard {
    /// Directory receiving file logs, if file logging is on.
    pub fn log_dir(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Filter from `RUST_LOG`, else from `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`CoachError::Config`] if a subscriber is already installed or
/// the log directory cannot be created.
pub fn init_tracing(config: &LoggingConfig, log_dir: &Path) -> Result<LogGuard> {
    let console = tracing_subscriber::fmt::layer().with_target(true);

    if !config.file {
        tracing_subscriber::registry()
            .with(env_filter(&config.filter))
            .with(console)
            .try_init()
            .map_err(|e| CoachError::Config(format!("tracing init failed: {e}")))?;
        return Ok(LogGuard {
            _file: None,
            path: None,
        });
    }

    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir);
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter(&config.filter))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| CoachError::Config(format!("tracing init failed: {e}")))?;

    Ok(LogGuard {
        _file: Some(guard),
        path: Some(log_dir.to_path_buf()),
    })
}

/// Remove log files older than [`MAX_LOG_AGE_DAYS`] or beyond [`MAX_LOG_FILES`].
fn prune_old_logs(log_dir: &Path) {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(MAX_LOG_AGE_DAYS * 86_400))
        .unwrap_or(UNIX_EPOCH);
    prune_logs(log_dir, cutoff, MAX_LOG_FILES);
}

fn prune_logs(log_dir: &Path, cutoff: SystemTime, max_files: usize) {
    let mut entries: Vec<(PathBuf, SystemTime)> = match fs::read_dir(log_dir) {
        Ok(dir) => dir
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                let name = path.file_name()?.to_str()?;
                if !name.starts_with(LOG_FILE_PREFIX) {
                    return None;
                }
                let mtime = path.metadata().ok()?.modified().ok()?;
                Some((path, mtime))
            })
            .collect(),
        Err(_) => return,
    };

    // Newest first.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (i, (path, mtime)) in entries.iter().enumerate() {
        if *mtime < cutoff || i >= max_files {
            let _ = fs::remove_file(path);
        }
    }
}
