//! Engine configuration.
//!
//! All tunables are plain durations-as-integers and counts so they can come
//! from a JSON file next to the binary. Component defaults live with their
//! components; this module only aggregates them and handles loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::health::HealthConfig;
use crate::pipeline::JobQueueConfig;
use crate::scheduler::SchedulerConfig;
use crate::volumes::VolumeWatcherConfig;
use crate::{Error, Result};

/// Default periodic cadence for snapshot persistence, in seconds.
const DEFAULT_SNAPSHOT_PERSIST_INTERVAL_SECS: u64 = 30;

/// Default periodic cadence for usage-stats persistence, in seconds.
const DEFAULT_STATS_PERSIST_INTERVAL_SECS: u64 = 300;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the snapshot and stats files.
    pub state_dir: PathBuf,
    /// Directory holding rolling log files.
    pub log_dir: PathBuf,
    /// How often the session snapshot is persisted.
    pub snapshot_persist_interval_secs: u64,
    /// How often the usage counters are persisted.
    pub stats_persist_interval_secs: u64,
    pub scheduler: SchedulerConfig,
    pub health: HealthConfig,
    pub volumes: VolumeWatcherConfig,
    pub queue: JobQueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            log_dir: PathBuf::from("logs"),
            snapshot_persist_interval_secs: DEFAULT_SNAPSHOT_PERSIST_INTERVAL_SECS,
            stats_persist_interval_secs: DEFAULT_STATS_PERSIST_INTERVAL_SECS,
            scheduler: SchedulerConfig::default(),
            health: HealthConfig::default(),
            volumes: VolumeWatcherConfig::default(),
            queue: JobQueueConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. A missing file yields the
    /// defaults; a present-but-invalid file is an error (silently falling
    /// back would mask operator typos on an unattended device).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;

        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reject configurations that would break scheduling assumptions.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(Error::config("scheduler.tick_interval_ms must be > 0"));
        }
        if self.volumes.min_poll_interval_secs == 0 {
            return Err(Error::config("volumes.min_poll_interval_secs must be > 0"));
        }
        if self.volumes.max_poll_interval_secs < self.volumes.min_poll_interval_secs {
            return Err(Error::config(
                "volumes.max_poll_interval_secs must be >= min_poll_interval_secs",
            ));
        }
        if self.health.evaluate_interval_secs == 0 {
            return Err(Error::config("health.evaluate_interval_secs must be > 0"));
        }
        if self.snapshot_persist_interval_secs == 0 {
            return Err(Error::config("snapshot_persist_interval_secs must be > 0"));
        }
        Ok(())
    }
}
