//! Logging initialization and log-file retention.
//!
//! Console plus daily-rolling file output via `tracing`. The returned
//! `WorkerGuard` must be kept alive for the process lifetime so buffered
//! file output is flushed on exit. Retention cleanup runs as a recurring
//! task on the engine's scheduler.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "snapbooth=info";

/// Rolling log file prefix.
pub const LOG_FILE_PREFIX: &str = "snapbooth.log";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Initialize logging with console and daily-rolling file output.
///
/// Returns the appender guard; keep it alive for the application lifetime.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| crate::Error::other(format!("failed to init logging: {e}")))?;

    Ok(guard)
}

/// Delete rolled log files older than `retention_days`.
///
/// The daily appender names files `<prefix>.YYYY-MM-DD`; anything else in
/// the directory is left alone.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<()> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let mut deleted = 0usize;

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_str) = name.strip_prefix(&format!("{LOG_FILE_PREFIX}.")) else {
            continue;
        };
        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "cleaned up old log files");
    }
    Ok(())
}
