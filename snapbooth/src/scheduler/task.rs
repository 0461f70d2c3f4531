//! Recurring task descriptors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Boxed async callback invoked on each due tick.
///
/// The callback receives the process-wide cancellation token and is expected
/// to observe it at its own I/O boundaries.
pub type TaskAction = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named recurring task owned by the scheduler's table.
///
/// Created at registration, mutated only by the driver's due check, never
/// removed while the scheduler is alive.
pub struct ScheduledTask {
    /// Stable name used in logs. Collisions are permitted but discouraged.
    pub name: String,
    /// Cadence between invocations.
    pub interval: Duration,
    /// Next due time. Re-armed to `now + interval` at dispatch time, so the
    /// schedule self-corrects against the clock rather than against callback
    /// completion.
    pub next_run: Instant,
    /// Set while an invocation is in flight; a due task with this flag set
    /// is skipped until the invocation finishes.
    pub running: Arc<AtomicBool>,
    /// The callback.
    pub action: TaskAction,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, interval: Duration, action: TaskAction) -> Self {
        Self {
            name: name.into(),
            interval,
            next_run: Instant::now() + interval,
            running: Arc::new(AtomicBool::new(false)),
            action,
        }
    }

    /// Whether this task should be dispatched at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.running.load(Ordering::Acquire) && now >= self.next_run
    }

    /// Mark the task in flight and re-arm its schedule.
    pub fn arm(&mut self, now: Instant) {
        self.running.store(true, Ordering::Release);
        self.next_run = now + self.interval;
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.running.load(Ordering::Acquire))
            .finish()
    }
}
