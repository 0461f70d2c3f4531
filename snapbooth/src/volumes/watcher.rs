//! The volume poll loop with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::enumerate::VolumeEnumerator;
use crate::status::StatusBoard;

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeWatcherConfig {
    /// Poll interval after a successful poll or an explicit refresh.
    pub min_poll_interval_secs: u64,
    /// Backoff ceiling.
    pub max_poll_interval_secs: u64,
}

impl Default for VolumeWatcherConfig {
    fn default() -> Self {
        Self {
            min_poll_interval_secs: 5,
            max_poll_interval_secs: 60,
        }
    }
}

impl VolumeWatcherConfig {
    fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval_secs)
    }

    fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_poll_interval_secs)
    }
}

/// Maintains the published snapshot of attached removable volumes.
///
/// A loop sleeps for the current interval, polls, and adjusts the interval:
/// success resets it to the minimum, failure doubles it up to the maximum.
/// Explicit refresh requests reset the interval and trigger an immediate
/// out-of-band poll. Polling is serialized through a single-permit
/// semaphore, so a refresh arriving while a poll is in flight coalesces
/// behind it instead of starting a second enumeration.
pub struct VolumeWatcher {
    enumerator: Arc<dyn VolumeEnumerator>,
    status: StatusBoard,
    config: VolumeWatcherConfig,
    interval: Arc<Mutex<Duration>>,
    poll_gate: Arc<Semaphore>,
    refresh: Arc<Notify>,
    cancellation_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl VolumeWatcher {
    pub fn new(
        enumerator: Arc<dyn VolumeEnumerator>,
        status: StatusBoard,
        config: VolumeWatcherConfig,
        cancellation_token: CancellationToken,
    ) -> Arc<Self> {
        let interval = config.min_interval();
        Arc::new(Self {
            enumerator,
            status,
            config,
            interval: Arc::new(Mutex::new(interval)),
            poll_gate: Arc::new(Semaphore::new(1)),
            refresh: Arc::new(Notify::new()),
            cancellation_token,
            handle: Mutex::new(None),
        })
    }

    /// Current backoff interval (the next scheduled sleep length).
    pub fn current_interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Spawn the poll loop. Idempotent; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("volume watcher already started");
            return;
        }

        info!(
            min_secs = self.config.min_poll_interval_secs,
            max_secs = self.config.max_poll_interval_secs,
            "starting volume watcher"
        );

        let watcher = self.clone();
        *handle = Some(tokio::spawn(async move {
            watcher.run().await;
        }));
    }

    /// Reset the backoff to the minimum and poll immediately, bypassing the
    /// current sleep. Called on user action or a device-attach notification.
    pub fn request_refresh(self: &Arc<Self>) {
        *self.interval.lock() = self.config.min_interval();

        let watcher = self.clone();
        tokio::spawn(async move {
            watcher.poll_once().await;
        });

        // Nudge the loop so its next wake reflects the reset interval.
        self.refresh.notify_one();
    }

    /// Wait for the loop to observe cancellation and exit.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        debug!("volume watcher stopped");
    }

    async fn run(self: Arc<Self>) {
        loop {
            let sleep_for = self.current_interval();

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => break,
                _ = self.refresh.notified() => {
                    // The refresh already polled out-of-band; fall through to
                    // re-read the (reset) interval for the next sleep.
                    continue;
                }
                _ = tokio::time::sleep(sleep_for) => {
                    self.poll_once().await;
                }
            }
        }

        debug!("volume watcher loop exited");
    }

    /// Run one serialized poll and adjust the backoff interval.
    pub async fn poll_once(&self) {
        // Single-permit gate: a request arriving while a poll is in flight
        // coalesces with it instead of starting a second enumeration.
        let Ok(_permit) = self.poll_gate.try_acquire() else {
            debug!("volume poll already in flight, coalescing");
            return;
        };
        if self.cancellation_token.is_cancelled() {
            return;
        }

        let enumerator = self.enumerator.clone();
        let outcome = tokio::task::spawn_blocking(move || enumerator.enumerate()).await;

        match outcome {
            Ok(Ok(volumes)) => {
                let published = self.status.publish_volumes(volumes);
                self.status.report_volume_ok();
                *self.interval.lock() = self.config.min_interval();
                debug!(count = published.len(), "volume poll succeeded");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "volume poll failed");
                self.status
                    .report_volume_fault(format!("cannot reach USB: {e}"));
                self.back_off();
            }
            Err(e) => {
                if self.cancellation_token.is_cancelled() {
                    return;
                }
                warn!(error = %e, "volume enumeration task failed");
                self.status
                    .report_volume_fault(format!("cannot reach USB: {e}"));
                self.back_off();
            }
        }
    }

    fn back_off(&self) {
        let mut interval = self.interval.lock();
        *interval = (*interval * 2).min(self.config.max_interval());
        debug!(next_poll_secs = interval.as_secs(), "volume poll backing off");
    }
}
