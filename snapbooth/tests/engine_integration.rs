//! Integration tests for the coordination engine.
//!
//! These drive the engine through its public surface with a scripted
//! volume enumerator and real (short) timers, covering the end-to-end
//! behaviors the unit tests cannot: periodic persistence, resume across a
//! restart, and export serialization under load.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use snapbooth::config::EngineConfig;
use snapbooth::engine::Engine;
use snapbooth::pipeline::Priority;
use snapbooth::volumes::VolumeEnumerator;
use tempfile::TempDir;

/// Enumerator whose result set and failure mode tests flip at runtime.
struct ScriptedEnumerator {
    fail: AtomicBool,
    volumes: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedEnumerator {
    fn new(volumes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            volumes: parking_lot::Mutex::new(volumes.iter().map(|s| s.to_string()).collect()),
        })
    }

    fn set_volumes(&self, volumes: &[&str]) {
        *self.volumes.lock() = volumes.iter().map(|s| s.to_string()).collect();
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl VolumeEnumerator for ScriptedEnumerator {
    fn enumerate(&self) -> snapbooth::Result<Vec<String>> {
        if self.fail.load(Ordering::SeqCst) {
            Err(snapbooth::Error::volume("bus unavailable"))
        } else {
            Ok(self.volumes.lock().clone())
        }
    }
}

/// Engine with tight cadences so tests finish quickly.
fn fast_engine(dir: &TempDir, enumerator: Arc<ScriptedEnumerator>) -> Engine {
    let mut config = EngineConfig {
        state_dir: dir.path().join("state"),
        log_dir: dir.path().join("logs"),
        snapshot_persist_interval_secs: 1,
        stats_persist_interval_secs: 1,
        ..EngineConfig::default()
    };
    config.scheduler.tick_interval_ms = 50;
    config.health.evaluate_interval_secs = 1;
    config.volumes.min_poll_interval_secs = 1;
    config.volumes.max_poll_interval_secs = 8;
    Engine::new(config, enumerator)
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_periodic_snapshot_lands_on_disk() {
        let dir = TempDir::new().unwrap();
        let engine = fast_engine(&dir, ScriptedEnumerator::new(&[]));

        engine.start().await.unwrap();
        engine.set_gallery_name("Friday wedding");

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let snapshot = engine
            .load_persisted_snapshot()
            .await
            .expect("snapshot not persisted by the periodic job");
        assert_eq!(snapshot.gallery_name, "Friday wedding");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_state_survives_restart() {
        let dir = TempDir::new().unwrap();

        let engine = fast_engine(&dir, ScriptedEnumerator::new(&[]));
        engine.start().await.unwrap();
        engine.set_gallery_name("Gala");
        engine.set_active_template_name(Some("strip-classic".to_string()));
        engine.set_selected_camera_name(Some("EOS R6".to_string()));
        engine.notify_camera_session_started();
        engine.record_photo_captured();
        engine.notify_camera_session_ended();
        engine.shutdown().await;

        let engine = fast_engine(&dir, ScriptedEnumerator::new(&[]));
        engine.start().await.unwrap();

        let snapshot = engine.status().state_snapshot();
        assert_eq!(snapshot.gallery_name, "Gala");
        assert_eq!(
            snapshot.active_template_name.as_deref(),
            Some("strip-classic")
        );
        assert_eq!(snapshot.selected_camera_name.as_deref(), Some("EOS R6"));

        let usage = engine.status().usage();
        assert_eq!(usage.sessions_started, 1);
        assert_eq!(usage.photos_captured, 1);

        engine.shutdown().await;
    }
}

mod volume_tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_detach_reconciles_selection() {
        let dir = TempDir::new().unwrap();
        let enumerator = ScriptedEnumerator::new(&["/media/usb1"]);
        let engine = fast_engine(&dir, enumerator.clone());

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.available_volumes(), vec!["/media/usb1"]);
        assert_eq!(engine.selected_volume().as_deref(), Some("/media/usb1"));

        // Swap the stick for another one and force a refresh.
        enumerator.set_volumes(&["/media/usb2"]);
        engine.request_volume_refresh();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.available_volumes(), vec!["/media/usb2"]);
        assert_eq!(engine.selected_volume().as_deref(), Some("/media/usb2"));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_failure_flags_unhealthy_until_recovery() {
        let dir = TempDir::new().unwrap();
        let enumerator = ScriptedEnumerator::new(&["/media/usb1"]);
        let engine = fast_engine(&dir, enumerator.clone());

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.is_hardware_healthy());

        enumerator.set_fail(true);
        engine.request_volume_refresh();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!engine.is_hardware_healthy());
        assert!(engine.health_message().contains("cannot reach USB"));

        enumerator.set_fail(false);
        engine.request_volume_refresh();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(engine.is_hardware_healthy());

        engine.shutdown().await;
    }
}

mod export_tests {
    use super::*;

    #[tokio::test]
    async fn test_high_priority_exports_jump_the_queue() {
        let dir = TempDir::new().unwrap();
        let engine = fast_engine(&dir, ScriptedEnumerator::new(&[]));
        engine.start().await.unwrap();

        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
        let log = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));

        // Occupy the worker so the next three jobs are all pending together.
        engine.enqueue_export_job("blocker", Priority::High, move |_| async move {
            let _ = hold_rx.await;
            Ok(())
        });
        for (context, priority) in [
            ("a", Priority::Low),
            ("b", Priority::High),
            ("c", Priority::Low),
        ] {
            let log = log.clone();
            engine.enqueue_export_job(context, priority, move |_| async move {
                log.lock().push(context.to_string());
                Ok(())
            });
        }

        hold_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*log.lock(), vec!["b", "a", "c"]);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_export_reports_usb_fault() {
        let dir = TempDir::new().unwrap();
        let engine = fast_engine(&dir, ScriptedEnumerator::new(&[]));
        engine.start().await.unwrap();

        engine.enqueue_export_job("copy gallery", Priority::High, |_| async {
            Err(snapbooth::Error::other("destination vanished"))
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!engine.is_hardware_healthy());
        assert!(engine.health_message().contains("copy gallery"));

        engine.shutdown().await;
    }
}
