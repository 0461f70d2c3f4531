//! Usage-counter persistence.
//!
//! Lifetime usage counters (sessions, captures, prints, exports) are kept on
//! the status board and flushed to disk on their own cadence with the same
//! atomic-write discipline as the session snapshot. Persist failures feed
//! the stats failure counter consumed by health evaluation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::utils::fs::write_atomic;

/// Canonical stats file name under the state directory.
pub const STATS_FILE: &str = "usage_stats.json";

/// Lifetime usage counters for the booth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub sessions_started: u64,
    pub photos_captured: u64,
    pub prints_completed: u64,
    pub exports_completed: u64,
}

/// Persists [`UsageStats`] with at most one writer at a time.
pub struct StatsStore {
    path: PathBuf,
    save_lock: tokio::sync::Mutex<()>,
}

impl StatsStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATS_FILE),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the on-disk counters.
    pub async fn save(&self, stats: &UsageStats) -> Result<()> {
        let _guard = self.save_lock.lock().await;

        let json = serde_json::to_vec_pretty(stats)?;
        write_atomic(self.path.clone(), json).await?;

        debug!(path = %self.path.display(), "usage stats persisted");
        Ok(())
    }

    /// Read the last committed counters; missing or corrupt files yield the
    /// zeroed default.
    pub async fn load(&self) -> UsageStats {
        let json = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return UsageStats::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read usage stats");
                return UsageStats::default();
            }
        };

        serde_json::from_slice(&json).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "usage stats file is corrupt, resetting");
            UsageStats::default()
        })
    }
}
