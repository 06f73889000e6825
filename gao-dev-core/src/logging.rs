//! Logging infrastructure for gao-dev
//!
//! The core emits structured key-value events through `tracing` and does
//! not care about the transport; this module wires the default sink for
//! host processes: a daily-rotated file under the XDG state directory,
//! with the rotation backlog capped by [`LoggingConfig::max_files`].

use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Active log file name; rotated files get a `.YYYY-MM-DD` suffix
const LOG_FILE_PREFIX: &str = "gao-dev.log";

/// Initialize the logging system.
///
/// The level comes from `RUST_LOG` when set, falling back to the config
/// file. Before the new writer lands another rotated file, the backlog is
/// trimmed to `max_files`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let pruned = prune_rotated_logs(&log_dir, config.max_files)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    // Non-blocking writer so slow disks never stall store operations
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        pruned_logs = pruned,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the active log file path
pub fn log_file_path() -> PathBuf {
    Config::state_dir().join(LOG_FILE_PREFIX)
}

/// Delete the oldest rotated log files beyond `keep`, returning how many
/// were removed.
///
/// Rotated files carry a `.YYYY-MM-DD` suffix, so a lexicographic sort is
/// a chronological sort. The active (suffix-less) file never counts
/// against the cap.
fn prune_rotated_logs(log_dir: &Path, keep: usize) -> Result<usize> {
    let mut rotated: Vec<PathBuf> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(LOG_FILE_PREFIX) && n.len() > LOG_FILE_PREFIX.len())
                .unwrap_or(false)
        })
        .collect();

    if rotated.len() <= keep {
        return Ok(0);
    }

    rotated.sort();
    let excess = rotated.len() - keep;
    for path in &rotated[..excess] {
        std::fs::remove_file(path)?;
    }
    Ok(excess)
}
