//! Durable session-state snapshots.
//!
//! The booth periodically serializes its session state to a single JSON
//! file so a restart (or power cut — this is an unattended kiosk) can resume
//! where the operator left off. Writes are atomic: a uniquely-named temp
//! file in the target directory is flushed and then renamed over the
//! canonical path, so a crash mid-write never corrupts the committed file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::utils::fs::write_atomic;

/// Canonical snapshot file name under the state directory.
pub const SNAPSHOT_FILE: &str = "session_snapshot.json";

/// Point-in-time serialization of the booth's session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub timestamp_utc: DateTime<Utc>,
    pub gallery_name: String,
    pub active_template_name: Option<String>,
    pub template_slot1_name: Option<String>,
    pub template_slot2_name: Option<String>,
    pub selected_camera_name: Option<String>,
    pub selected_printer_name: Option<String>,
    pub is_hardware_healthy: bool,
    pub last_camera_frame_utc: DateTime<Utc>,
    pub last_usb_refresh_utc: DateTime<Utc>,
}

/// Persists [`StateSnapshot`]s with at most one writer at a time.
pub struct SnapshotStore {
    path: PathBuf,
    save_lock: tokio::sync::Mutex<()>,
}

impl SnapshotStore {
    /// Create a store rooted at `state_dir`. The directory is created lazily
    /// on the first save.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SNAPSHOT_FILE),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the canonical snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the on-disk snapshot.
    ///
    /// The caller is responsible for bumping or resetting the snapshot
    /// failure counter based on the outcome.
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let _guard = self.save_lock.lock().await;

        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(self.path.clone(), json).await?;

        debug!(path = %self.path.display(), "session snapshot persisted");
        Ok(())
    }

    /// Read the last committed snapshot, if one exists and parses.
    ///
    /// A missing or corrupt file yields `None`; resuming from nothing is
    /// always acceptable, a crash on boot is not.
    pub async fn load(&self) -> Option<StateSnapshot> {
        let json = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read snapshot");
                return None;
            }
        };

        match serde_json::from_slice(&json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot file is corrupt, ignoring");
                None
            }
        }
    }
}
