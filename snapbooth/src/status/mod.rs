//! The shared hardware-status board.
//!
//! All state that the background loops and the foreground share — the health
//! verdict, the heartbeat clock, persistence failure counters, the published
//! volume list, the session fields captured by snapshots, and the usage
//! counters — lives in one explicitly-owned struct behind a single lock.
//! Every mutation goes through a named setter operation; no component holds
//! the lock across an await point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::health::{self, FaultSource, HealthConfig, HealthInputs, HealthState, READY_MESSAGE};
use crate::snapshot::StateSnapshot;
use crate::stats::UsageStats;

#[derive(Debug)]
struct BoardInner {
    healthy: bool,
    message: String,
    fault: Option<FaultSource>,
    session_active: bool,
    last_camera_frame: DateTime<Utc>,
    last_usb_refresh: DateTime<Utc>,
    snapshot_failures: u32,
    stats_failures: u32,
    volumes: Vec<String>,
    selected_volume: Option<String>,
    gallery_name: String,
    active_template_name: Option<String>,
    template_slot1_name: Option<String>,
    template_slot2_name: Option<String>,
    selected_camera_name: Option<String>,
    selected_printer_name: Option<String>,
    usage: UsageStats,
}

/// Cheaply-clonable handle to the process-wide hardware status.
#[derive(Clone)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board with both heartbeats primed to "now" so that nothing
    /// looks stale before the first real signal arrives.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(Mutex::new(BoardInner {
                healthy: true,
                message: READY_MESSAGE.to_string(),
                fault: None,
                session_active: false,
                last_camera_frame: now,
                last_usb_refresh: now,
                snapshot_failures: 0,
                stats_failures: 0,
                volumes: Vec::new(),
                selected_volume: None,
                gallery_name: String::new(),
                active_template_name: None,
                template_slot1_name: None,
                template_slot2_name: None,
                selected_camera_name: None,
                selected_printer_name: None,
                usage: UsageStats::default(),
            })),
        }
    }

    // ---- read surface (consumed by the UI) ----

    pub fn is_hardware_healthy(&self) -> bool {
        self.inner.lock().healthy
    }

    pub fn health_message(&self) -> String {
        self.inner.lock().message.clone()
    }

    pub fn health(&self) -> HealthState {
        let inner = self.inner.lock();
        HealthState {
            healthy: inner.healthy,
            message: inner.message.clone(),
        }
    }

    pub fn available_volumes(&self) -> Vec<String> {
        self.inner.lock().volumes.clone()
    }

    pub fn selected_volume(&self) -> Option<String> {
        self.inner.lock().selected_volume.clone()
    }

    pub fn usage(&self) -> UsageStats {
        self.inner.lock().usage.clone()
    }

    // ---- heartbeat clock ----

    /// Record a camera frame arrival. Called from the capture path on every
    /// delivered frame.
    pub fn record_camera_frame(&self) {
        self.inner.lock().last_camera_frame = Utc::now();
    }

    pub fn last_camera_frame(&self) -> DateTime<Utc> {
        self.inner.lock().last_camera_frame
    }

    pub fn last_usb_refresh(&self) -> DateTime<Utc> {
        self.inner.lock().last_usb_refresh
    }

    // ---- explicit fault / recovery reports ----

    /// Flip the board unhealthy because of a camera fault.
    pub fn report_camera_fault(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "camera fault reported");

        let mut inner = self.inner.lock();
        inner.healthy = false;
        inner.message = message;
        inner.fault = Some(FaultSource::Camera);
    }

    /// Clear a camera fault. With no message the default ready message is
    /// restored.
    pub fn report_camera_recovery(&self, message: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.healthy = true;
        inner.message = message.unwrap_or(READY_MESSAGE).to_string();
        inner.fault = None;
        drop(inner);

        info!("camera recovered");
    }

    /// Record a failed interaction with removable storage.
    pub fn report_volume_fault(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "removable-storage fault reported");

        let mut inner = self.inner.lock();
        inner.healthy = false;
        inner.message = message;
        inner.fault = Some(FaultSource::Usb);
    }

    /// Record a successful interaction with removable storage: advance the
    /// USB heartbeat and, if the current fault is USB-owned, clear it.
    pub fn report_volume_ok(&self) {
        let mut inner = self.inner.lock();
        inner.last_usb_refresh = Utc::now();
        if inner.fault == Some(FaultSource::Usb) {
            inner.healthy = true;
            inner.message = READY_MESSAGE.to_string();
            inner.fault = None;
        }
    }

    // ---- camera session bracketing ----

    pub fn set_session_active(&self, active: bool) {
        let mut inner = self.inner.lock();
        inner.session_active = active;
        if active {
            // A fresh session starts its liveness window now rather than
            // inheriting a timestamp from before the camera was opened.
            inner.last_camera_frame = Utc::now();
            inner.usage.sessions_started += 1;
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.inner.lock().session_active
    }

    // ---- persistence failure counters ----

    /// Returns the new consecutive failure count.
    pub fn record_snapshot_failure(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.snapshot_failures += 1;
        inner.snapshot_failures
    }

    pub fn record_snapshot_success(&self) {
        self.inner.lock().snapshot_failures = 0;
    }

    /// Returns the new consecutive failure count.
    pub fn record_stats_failure(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.stats_failures += 1;
        inner.stats_failures
    }

    pub fn record_stats_success(&self) {
        self.inner.lock().stats_failures = 0;
    }

    // ---- volume snapshot ----

    /// Replace the published volume list with a freshly enumerated one.
    ///
    /// Identifiers are deduplicated case-insensitively and sorted for display
    /// stability. A selection that no longer exists is cleared; when exactly
    /// one volume remains and nothing is selected, it is auto-selected.
    pub fn publish_volumes(&self, raw: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut volumes: Vec<String> = raw
            .into_iter()
            .filter(|v| seen.insert(v.to_lowercase()))
            .collect();
        volumes.sort_by_key(|v| v.to_lowercase());

        let mut inner = self.inner.lock();

        let selection_detached = match &inner.selected_volume {
            Some(selected) => !volumes.iter().any(|v| v.eq_ignore_ascii_case(selected)),
            None => false,
        };
        if selection_detached
            && let Some(selected) = inner.selected_volume.take()
        {
            debug!(volume = %selected, "selected volume detached, clearing selection");
        }

        if inner.selected_volume.is_none() && volumes.len() == 1 {
            debug!(volume = %volumes[0], "auto-selecting sole attached volume");
            inner.selected_volume = Some(volumes[0].clone());
        }

        inner.volumes = volumes.clone();
        volumes
    }

    pub fn select_volume(&self, volume: Option<String>) {
        self.inner.lock().selected_volume = volume;
    }

    // ---- session fields captured by snapshots ----

    pub fn set_gallery_name(&self, name: impl Into<String>) {
        self.inner.lock().gallery_name = name.into();
    }

    pub fn set_active_template_name(&self, name: Option<String>) {
        self.inner.lock().active_template_name = name;
    }

    pub fn set_template_slots(&self, slot1: Option<String>, slot2: Option<String>) {
        let mut inner = self.inner.lock();
        inner.template_slot1_name = slot1;
        inner.template_slot2_name = slot2;
    }

    pub fn set_selected_camera_name(&self, name: Option<String>) {
        self.inner.lock().selected_camera_name = name;
    }

    pub fn set_selected_printer_name(&self, name: Option<String>) {
        self.inner.lock().selected_printer_name = name;
    }

    // ---- usage counters ----

    pub fn record_photo_captured(&self) {
        self.inner.lock().usage.photos_captured += 1;
    }

    pub fn record_print_completed(&self) {
        self.inner.lock().usage.prints_completed += 1;
    }

    pub fn record_export_completed(&self) {
        self.inner.lock().usage.exports_completed += 1;
    }

    /// Seed the live counters from a previously persisted set.
    pub fn set_usage(&self, usage: UsageStats) {
        self.inner.lock().usage = usage;
    }

    // ---- evaluation & snapshots ----

    /// Run the health ladder against the board's current signals and apply
    /// the verdict.
    ///
    /// The ready message is only written on the unhealthy→healthy
    /// transition; repeated healthy verdicts leave the message untouched.
    pub fn evaluate_health(&self, config: &HealthConfig) -> HealthState {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let inputs = HealthInputs {
            snapshot_failures: inner.snapshot_failures,
            stats_failures: inner.stats_failures,
            session_active: inner.session_active,
            last_camera_frame: inner.last_camera_frame,
            last_usb_refresh: inner.last_usb_refresh,
        };
        let verdict = health::evaluate(&inputs, config, now);

        if verdict.healthy {
            if !inner.healthy {
                info!("hardware health recovered");
                inner.healthy = true;
                inner.message = READY_MESSAGE.to_string();
                inner.fault = None;
            }
        } else {
            if inner.healthy || inner.message != verdict.message {
                warn!(cause = verdict.message, "hardware health degraded");
            }
            inner.healthy = false;
            inner.message = verdict.message.to_string();
            inner.fault = verdict.source;
        }

        HealthState {
            healthy: inner.healthy,
            message: inner.message.clone(),
        }
    }

    /// Capture a point-in-time snapshot of the session state for persistence.
    pub fn state_snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock();
        StateSnapshot {
            timestamp_utc: Utc::now(),
            gallery_name: inner.gallery_name.clone(),
            active_template_name: inner.active_template_name.clone(),
            template_slot1_name: inner.template_slot1_name.clone(),
            template_slot2_name: inner.template_slot2_name.clone(),
            selected_camera_name: inner.selected_camera_name.clone(),
            selected_printer_name: inner.selected_printer_name.clone(),
            is_hardware_healthy: inner.healthy,
            last_camera_frame_utc: inner.last_camera_frame,
            last_usb_refresh_utc: inner.last_usb_refresh,
        }
    }

    /// Restore session fields from a snapshot written by a previous run.
    ///
    /// Health and heartbeat fields are deliberately not restored; liveness
    /// starts fresh on every boot.
    pub fn seed_from_snapshot(&self, snapshot: &StateSnapshot) {
        let mut inner = self.inner.lock();
        inner.gallery_name = snapshot.gallery_name.clone();
        inner.active_template_name = snapshot.active_template_name.clone();
        inner.template_slot1_name = snapshot.template_slot1_name.clone();
        inner.template_slot2_name = snapshot.template_slot2_name.clone();
        inner.selected_camera_name = snapshot.selected_camera_name.clone();
        inner.selected_printer_name = snapshot.selected_printer_name.clone();
    }
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StatusBoard")
            .field("healthy", &inner.healthy)
            .field("message", &inner.message)
            .field("volumes", &inner.volumes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CAMERA_STALE_MESSAGE, USB_STALE_MESSAGE};

    #[test]
    fn test_fault_then_recovery_restores_ready_message() {
        let board = StatusBoard::new();

        board.report_camera_fault("x");
        assert!(!board.is_hardware_healthy());
        assert_eq!(board.health_message(), "x");

        board.report_camera_recovery(None);
        assert!(board.is_hardware_healthy());
        assert_eq!(board.health_message(), READY_MESSAGE);
    }

    #[test]
    fn test_volume_ok_clears_only_usb_faults() {
        let board = StatusBoard::new();

        board.report_volume_fault("cannot reach USB");
        board.report_volume_ok();
        assert!(board.is_hardware_healthy());

        board.report_camera_fault("camera gone");
        board.report_volume_ok();
        assert!(!board.is_hardware_healthy());
        assert_eq!(board.health_message(), "camera gone");
    }

    #[test]
    fn test_publish_volumes_sorts_and_dedupes() {
        let board = StatusBoard::new();
        let published = board.publish_volumes(vec![
            "/media/USB2".to_string(),
            "/media/usb1".to_string(),
            "/media/Usb2".to_string(),
        ]);

        assert_eq!(published, vec!["/media/usb1", "/media/USB2"]);
    }

    #[test]
    fn test_publish_volumes_reconciles_selection() {
        let board = StatusBoard::new();

        // Sole volume is auto-selected.
        board.publish_volumes(vec!["/media/usb1".to_string()]);
        assert_eq!(board.selected_volume().as_deref(), Some("/media/usb1"));

        // Selection survives while the volume stays attached.
        board.publish_volumes(vec![
            "/media/usb1".to_string(),
            "/media/usb2".to_string(),
        ]);
        assert_eq!(board.selected_volume().as_deref(), Some("/media/usb1"));

        // Detaching the selected volume clears the selection and the sole
        // remaining volume takes over.
        board.publish_volumes(vec!["/media/usb2".to_string()]);
        assert_eq!(board.selected_volume().as_deref(), Some("/media/usb2"));

        // Nothing attached: selection stays empty.
        board.publish_volumes(Vec::new());
        assert_eq!(board.selected_volume(), None);
    }

    #[test]
    fn test_evaluate_health_camera_scoped_to_session() {
        let board = StatusBoard::new();
        let config = HealthConfig {
            camera_timeout_secs: 0,
            ..HealthConfig::default()
        };

        // Stale camera outside a session: healthy.
        assert!(board.evaluate_health(&config).healthy);

        board.set_session_active(true);
        // The camera heartbeat was primed by session start; force staleness
        // by evaluating with a zero timeout after a beat of real time.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let state = board.evaluate_health(&config);
        assert!(!state.healthy);
        assert_eq!(state.message, CAMERA_STALE_MESSAGE);

        board.set_session_active(false);
        assert!(board.evaluate_health(&config).healthy);
    }

    #[test]
    fn test_evaluate_health_usb_staleness() {
        let board = StatusBoard::new();
        let config = HealthConfig {
            usb_timeout_secs: 0,
            ..HealthConfig::default()
        };

        std::thread::sleep(std::time::Duration::from_millis(5));
        let state = board.evaluate_health(&config);
        assert!(!state.healthy);
        assert_eq!(state.message, USB_STALE_MESSAGE);

        // A successful poll self-clears on the next evaluation.
        board.report_volume_ok();
        assert!(board.evaluate_health(&HealthConfig::default()).healthy);
    }

    #[test]
    fn test_failure_counters_reset_on_success() {
        let board = StatusBoard::new();
        let config = HealthConfig::default();

        for _ in 0..config.snapshot_failure_threshold {
            board.record_snapshot_failure();
        }
        assert!(!board.evaluate_health(&config).healthy);

        board.record_snapshot_success();
        assert!(board.evaluate_health(&config).healthy);
    }

    #[test]
    fn test_session_start_bumps_usage() {
        let board = StatusBoard::new();
        board.set_session_active(true);
        board.set_session_active(false);
        board.set_session_active(true);

        assert_eq!(board.usage().sessions_started, 2);
    }
}
