use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "retrace.log";
pub const LOG_RETENTION_DAYS: u64 = 7;

/// Console plus daily rolling file logging. `RUST_LOG` overrides `verbosity`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the whole run.
pub fn init_logging(log_dir: &Path, verbosity: u8) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let removed = prune_logs(log_dir, Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60));
    if removed > 0 {
        debug!("Removed {} old log file(s)", removed);
    }
    Ok(guard)
}

/// Deletes log files in `dir` last modified more than `max_age` ago. Returns how many
/// were removed.
pub fn prune_logs(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old log {}: {}", path.display(), e),
            }
        }
    }
    removed
}
