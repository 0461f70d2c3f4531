//! Hardware health evaluation.
//!
//! A single coarse verdict is computed from several weakly-correlated
//! signals: persistence failure counters and liveness heartbeats. The
//! decision ladder is ordered so the most actionable cause wins; the first
//! matching condition produces the verdict and later conditions are not
//! consulted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Message published while everything is operational.
pub const READY_MESSAGE: &str = "system ready";

/// Message for an impaired session-snapshot store.
pub const SNAPSHOT_STORAGE_MESSAGE: &str = "state storage impaired";

/// Message for an impaired usage-counter store.
pub const STATS_STORAGE_MESSAGE: &str = "usage-counter storage impaired";

/// Message for a stalled camera feed.
pub const CAMERA_STALE_MESSAGE: &str = "no camera frames";

/// Message for an unreachable removable-storage subsystem.
pub const USB_STALE_MESSAGE: &str = "USB unreachable";

/// The aggregated verdict surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    /// Whether all monitored hardware facilities look operational.
    pub healthy: bool,
    /// Human-readable description of the most recent negative cause, or the
    /// ready message.
    pub message: String,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            message: READY_MESSAGE.to_string(),
        }
    }
}

/// Which facility caused the current unhealthy verdict.
///
/// Tracked alongside the message so that a recovery signal from one facility
/// (for example a successful volume poll) only clears a fault it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    Camera,
    Usb,
    SnapshotStorage,
    StatsStorage,
}

/// Thresholds and cadences for health evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Maximum age of the last camera frame while a session is active.
    pub camera_timeout_secs: u64,
    /// Maximum age of the last successful volume refresh.
    pub usb_timeout_secs: u64,
    /// Consecutive snapshot-write failures before flagging unhealthy.
    pub snapshot_failure_threshold: u32,
    /// Consecutive stats-persist failures before flagging unhealthy.
    pub stats_failure_threshold: u32,
    /// How often the periodic evaluation runs.
    pub evaluate_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            camera_timeout_secs: 10,
            usb_timeout_secs: 120,
            snapshot_failure_threshold: 3,
            stats_failure_threshold: 3,
            evaluate_interval_secs: 10,
        }
    }
}

/// Point-in-time inputs to the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub snapshot_failures: u32,
    pub stats_failures: u32,
    pub session_active: bool,
    pub last_camera_frame: DateTime<Utc>,
    pub last_usb_refresh: DateTime<Utc>,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub healthy: bool,
    pub message: &'static str,
    pub source: Option<FaultSource>,
}

impl Verdict {
    fn unhealthy(message: &'static str, source: FaultSource) -> Self {
        Self {
            healthy: false,
            message,
            source: Some(source),
        }
    }

    fn healthy() -> Self {
        Self {
            healthy: true,
            message: READY_MESSAGE,
            source: None,
        }
    }
}

/// Evaluate the health ladder. First matching condition wins.
///
/// Camera liveness is scoped to an active session: outside a session a stale
/// camera timestamp never flags unhealthy.
pub fn evaluate(inputs: &HealthInputs, config: &HealthConfig, now: DateTime<Utc>) -> Verdict {
    if inputs.snapshot_failures >= config.snapshot_failure_threshold {
        return Verdict::unhealthy(SNAPSHOT_STORAGE_MESSAGE, FaultSource::SnapshotStorage);
    }

    if inputs.stats_failures >= config.stats_failure_threshold {
        return Verdict::unhealthy(STATS_STORAGE_MESSAGE, FaultSource::StatsStorage);
    }

    if inputs.session_active
        && is_stale(inputs.last_camera_frame, config.camera_timeout_secs, now)
    {
        return Verdict::unhealthy(CAMERA_STALE_MESSAGE, FaultSource::Camera);
    }

    if is_stale(inputs.last_usb_refresh, config.usb_timeout_secs, now) {
        return Verdict::unhealthy(USB_STALE_MESSAGE, FaultSource::Usb);
    }

    Verdict::healthy()
}

fn is_stale(last: DateTime<Utc>, timeout_secs: u64, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last) > Duration::seconds(timeout_secs as i64)
}
