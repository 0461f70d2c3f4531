//! The coordination facade.
//!
//! `Engine` owns every background component — status board, periodic
//! scheduler, export worker, volume watcher, snapshot and stats stores —
//! wires them together, and exposes the operations external collaborators
//! (the UI, the capture path, device notifications) call into. Nothing in
//! here blocks the interactive foreground: triggers update shared state or
//! enqueue work and return.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::health::HealthState;
use crate::logging;
use crate::pipeline::{ExportWorker, JobQueue, Priority};
use crate::scheduler::Scheduler;
use crate::snapshot::{SnapshotStore, StateSnapshot};
use crate::stats::StatsStore;
use crate::status::StatusBoard;
use crate::volumes::{VolumeEnumerator, VolumeWatcher};
use crate::{Error, Result};

/// Cadence of the log-retention cleanup task.
const LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// The engine's public surface.
pub struct Engine {
    config: EngineConfig,
    status: StatusBoard,
    scheduler: Scheduler,
    queue: Arc<JobQueue>,
    worker: ExportWorker,
    watcher: Arc<VolumeWatcher>,
    snapshot_store: Arc<SnapshotStore>,
    stats_store: Arc<StatsStore>,
    cancellation_token: CancellationToken,
    started: AtomicBool,
}

impl Engine {
    /// Assemble the engine. Nothing runs until [`Engine::start`].
    pub fn new(config: EngineConfig, enumerator: Arc<dyn VolumeEnumerator>) -> Self {
        let cancellation_token = CancellationToken::new();
        let status = StatusBoard::new();

        let scheduler =
            Scheduler::with_config(cancellation_token.clone(), config.scheduler.clone());
        let queue = Arc::new(JobQueue::with_config(config.queue.clone()));
        let worker = ExportWorker::new(queue.clone(), status.clone(), cancellation_token.clone());
        let watcher = VolumeWatcher::new(
            enumerator,
            status.clone(),
            config.volumes.clone(),
            cancellation_token.clone(),
        );
        let snapshot_store = Arc::new(SnapshotStore::new(&config.state_dir));
        let stats_store = Arc::new(StatsStore::new(&config.state_dir));

        Self {
            config,
            status,
            scheduler,
            queue,
            worker,
            watcher,
            snapshot_store,
            stats_store,
            cancellation_token,
            started: AtomicBool::new(false),
        }
    }

    /// Resume persisted state, register the periodic jobs, and launch the
    /// background loops. Idempotent; a second call is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("engine already started");
            return Ok(());
        }

        self.config.validate()?;

        // Session resume: both loads are best-effort.
        if let Some(snapshot) = self.snapshot_store.load().await {
            info!(
                gallery = %snapshot.gallery_name,
                "resuming session from persisted snapshot"
            );
            self.status.seed_from_snapshot(&snapshot);
        }
        self.status.set_usage(self.stats_store.load().await);

        self.register_periodic_jobs();

        self.scheduler.start();
        self.worker.start();
        self.watcher.start();

        // Populate the volume list promptly instead of waiting out the first
        // poll interval.
        self.watcher.request_refresh();

        info!("background coordination engine started");
        Ok(())
    }

    fn register_periodic_jobs(&self) {
        let health_config = self.config.health.clone();
        let status = self.status.clone();
        self.scheduler.register(
            "evaluate-health",
            Duration::from_secs(self.config.health.evaluate_interval_secs),
            move |_| {
                let status = status.clone();
                let health_config = health_config.clone();
                async move {
                    status.evaluate_health(&health_config);
                    Ok(())
                }
            },
        );

        let status = self.status.clone();
        let store = self.snapshot_store.clone();
        self.scheduler.register(
            "persist-snapshot",
            Duration::from_secs(self.config.snapshot_persist_interval_secs),
            move |_| {
                let status = status.clone();
                let store = store.clone();
                async move {
                    match store.save(&status.state_snapshot()).await {
                        Ok(()) => {
                            status.record_snapshot_success();
                            Ok(())
                        }
                        Err(e) => {
                            let failures = status.record_snapshot_failure();
                            Err(Error::other(format!(
                                "snapshot persist failed ({failures} consecutive): {e}"
                            )))
                        }
                    }
                }
            },
        );

        let status = self.status.clone();
        let store = self.stats_store.clone();
        self.scheduler.register(
            "persist-stats",
            Duration::from_secs(self.config.stats_persist_interval_secs),
            move |_| {
                let status = status.clone();
                let store = store.clone();
                async move {
                    match store.save(&status.usage()).await {
                        Ok(()) => {
                            status.record_stats_success();
                            Ok(())
                        }
                        Err(e) => {
                            let failures = status.record_stats_failure();
                            Err(Error::other(format!(
                                "stats persist failed ({failures} consecutive): {e}"
                            )))
                        }
                    }
                }
            },
        );

        let log_dir = self.config.log_dir.clone();
        self.scheduler
            .register("log-cleanup", LOG_CLEANUP_INTERVAL, move |_| {
                let log_dir = log_dir.clone();
                async move {
                    logging::cleanup_old_logs(&log_dir, logging::LOG_RETENTION_DAYS).await?;
                    Ok(())
                }
            });
    }

    /// Stop issuing work, join every background loop, and persist a final
    /// snapshot so the next boot resumes from the very last state.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        self.cancellation_token.cancel();

        self.scheduler.stop().await;
        self.worker.stop().await;
        self.watcher.stop().await;

        if let Err(e) = self.snapshot_store.save(&self.status.state_snapshot()).await {
            warn!(error = %e, "final snapshot persist failed");
        }
        if let Err(e) = self.stats_store.save(&self.status.usage()).await {
            warn!(error = %e, "final stats persist failed");
        }

        info!("engine stopped");
    }

    // ---- read surface (consumed by the UI) ----

    pub fn is_hardware_healthy(&self) -> bool {
        self.status.is_hardware_healthy()
    }

    pub fn health_message(&self) -> String {
        self.status.health_message()
    }

    pub fn health(&self) -> HealthState {
        self.status.health()
    }

    pub fn available_volumes(&self) -> Vec<String> {
        self.status.available_volumes()
    }

    pub fn selected_volume(&self) -> Option<String> {
        self.status.selected_volume()
    }

    // ---- write/trigger surface ----

    /// Called by the capture path on every delivered camera frame.
    pub fn report_camera_heartbeat(&self) {
        self.status.record_camera_frame();
    }

    pub fn report_camera_fault(&self, message: impl Into<String>) {
        self.status.report_camera_fault(message);
    }

    pub fn report_camera_recovery(&self, message: Option<&str>) {
        self.status.report_camera_recovery(message);
    }

    /// Bracket a camera session. Liveness is only evaluated inside the
    /// bracket; both calls re-evaluate health synchronously.
    pub fn notify_camera_session_started(&self) {
        self.status.set_session_active(true);
        self.status.evaluate_health(&self.config.health);
    }

    pub fn notify_camera_session_ended(&self) {
        self.status.set_session_active(false);
        self.status.evaluate_health(&self.config.health);
    }

    /// Reset the poll backoff and refresh the volume list immediately.
    pub fn request_volume_refresh(&self) {
        self.watcher.request_refresh();
    }

    /// Queue a side-effecting export job for the single worker. Returns the
    /// job's sequence number.
    pub fn enqueue_export_job<F, Fut>(
        &self,
        context: impl Into<String>,
        priority: Priority,
        work: F,
    ) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.queue.enqueue(context, priority, work)
    }

    pub fn select_volume(&self, volume: Option<String>) {
        self.status.select_volume(volume);
    }

    pub fn record_photo_captured(&self) {
        self.status.record_photo_captured();
    }

    pub fn record_print_completed(&self) {
        self.status.record_print_completed();
    }

    // ---- session fields captured by snapshots ----

    pub fn set_gallery_name(&self, name: impl Into<String>) {
        self.status.set_gallery_name(name);
    }

    pub fn set_active_template_name(&self, name: Option<String>) {
        self.status.set_active_template_name(name);
    }

    pub fn set_template_slots(&self, slot1: Option<String>, slot2: Option<String>) {
        self.status.set_template_slots(slot1, slot2);
    }

    pub fn set_selected_camera_name(&self, name: Option<String>) {
        self.status.set_selected_camera_name(name);
    }

    pub fn set_selected_printer_name(&self, name: Option<String>) {
        self.status.set_selected_printer_name(name);
    }

    // ---- introspection ----

    /// Direct handle to the shared status board, for collaborators that
    /// report through it (e.g. export jobs calling the USB success helper).
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// The last committed snapshot on disk, if any.
    pub async fn load_persisted_snapshot(&self) -> Option<StateSnapshot> {
        self.snapshot_store.load().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
