//! The periodic scheduler driver.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::task::{ScheduledTask, TaskAction};
use crate::Result;

/// Default driver tick period in milliseconds.
///
/// Must stay well below every registered interval; due checks happen at this
/// granularity, so a task can fire up to one tick late.
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Driver tick period in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

/// Tick-driven dispatcher for named recurring callbacks.
///
/// Each driver tick takes the table lock once, selects every task that is
/// due and not already running, re-arms those tasks, and then — outside the
/// lock — dispatches each one onto a `JoinSet` owned by the driver. Task
/// errors are logged and swallowed; the running flag is cleared on every
/// exit path, including panics.
pub struct Scheduler {
    tasks: Arc<Mutex<Vec<ScheduledTask>>>,
    config: SchedulerConfig,
    cancellation_token: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self::with_config(cancellation_token, SchedulerConfig::default())
    }

    pub fn with_config(cancellation_token: CancellationToken, config: SchedulerConfig) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            config,
            cancellation_token,
            driver: Mutex::new(None),
        }
    }

    /// Register a recurring task. The first invocation is due one full
    /// `interval` after registration.
    ///
    /// Registration is allowed before or after `start`; names are not
    /// deduplicated, so callers should use stable unique names.
    pub fn register<F, Fut>(&self, name: impl Into<String>, interval: Duration, action: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, ?interval, "registering periodic task");

        let action: TaskAction = Arc::new(move |token| Box::pin(action(token)));
        self.tasks
            .lock()
            .push(ScheduledTask::new(name, interval, action));
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Spawn the driver loop. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            warn!("scheduler already started");
            return;
        }

        info!(
            tick_ms = self.config.tick_interval_ms,
            tasks = self.task_count(),
            "starting periodic scheduler"
        );

        let tasks = self.tasks.clone();
        let token = self.cancellation_token.clone();
        let tick = Duration::from_millis(self.config.tick_interval_ms);

        *driver = Some(tokio::spawn(async move {
            run_driver(tasks, token, tick).await;
        }));
    }

    /// Stop issuing ticks and wait for the driver, which in turn waits for
    /// every in-flight invocation to finish. Callbacks are expected to
    /// observe the cancellation token promptly but are not forcibly killed.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!("periodic scheduler stopped");
    }
}

async fn run_driver(
    tasks: Arc<Mutex<Vec<ScheduledTask>>>,
    token: CancellationToken,
    tick: Duration,
) {
    let mut ticker = tokio::time::interval(tick);
    // A stalled process must not replay missed ticks as a burst; the
    // self-correcting schedule already re-arms relative to "now".
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("scheduler driver shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        // Reap finished invocations so the set does not grow unbounded.
        while in_flight.try_join_next().is_some() {}

        let now = Instant::now();
        let due: Vec<(String, Arc<AtomicBool>, TaskAction)> = {
            let mut table = tasks.lock();
            table
                .iter_mut()
                .filter(|t| t.is_due(now))
                .map(|t| {
                    t.arm(now);
                    (t.name.clone(), t.running.clone(), t.action.clone())
                })
                .collect()
        };

        for (name, running, action) in due {
            let task_token = token.clone();
            in_flight.spawn(async move {
                // Clears the running flag on every exit path, including a
                // panicking action.
                let _guard = RunningGuard(running);

                if let Err(e) = action(task_token).await {
                    warn!(task = %name, error = %e, "periodic task failed");
                }
            });
        }
    }

    // Join in-flight invocations before reporting the driver done.
    while in_flight.join_next().await.is_some() {}
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
