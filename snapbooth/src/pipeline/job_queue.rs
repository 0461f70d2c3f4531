//! In-memory priority job queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Result;

/// Job priority. High jobs are always dequeued before Low jobs regardless of
/// arrival order; within a class, first-enqueued-first-served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Low,
}

type JobFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;

/// A one-shot unit of side-effecting work.
///
/// Owned by the queue until dequeued by the worker, destroyed after
/// execution regardless of outcome. There is no retry unless the caller
/// re-enqueues.
pub struct Job {
    /// Human-readable label for diagnostics.
    pub context: String,
    pub priority: Priority,
    /// Enqueue order, for diagnostics.
    pub seq: u64,
    work: JobFn,
}

impl Job {
    /// Consume the job and run its callback.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        (self.work)(token).await
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("context", &self.context)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Configuration for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    /// Queue depth at which enqueues start logging warnings. The queue is
    /// unbounded; this only surfaces sustained backlog.
    pub warning_threshold: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 50,
        }
    }
}

#[derive(Default)]
struct QueueInner {
    high: VecDeque<Job>,
    low: VecDeque<Job>,
}

impl QueueInner {
    fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }
}

/// Two FIFO queues drained High-first by a single consumer.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    notify: Arc<Notify>,
    next_seq: AtomicU64,
    config: JobQueueConfig,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_config(JobQueueConfig::default())
    }

    pub fn with_config(config: JobQueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Arc::new(Notify::new()),
            next_seq: AtomicU64::new(0),
            config,
        }
    }

    /// Insert a job and signal the worker. Non-blocking; returns the job's
    /// sequence number.
    pub fn enqueue<F, Fut>(&self, context: impl Into<String>, priority: Priority, work: F) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let context = context.into();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            context: context.clone(),
            priority,
            seq,
            work: Box::new(move |token| Box::pin(work(token))),
        };

        let depth = {
            let mut inner = self.inner.lock();
            match priority {
                Priority::High => inner.high.push_back(job),
                Priority::Low => inner.low.push_back(job),
            }
            inner.len()
        };

        debug!(context = %context, ?priority, seq, depth, "job enqueued");
        if depth >= self.config.warning_threshold {
            warn!(depth, "export job queue backlog");
        }

        self.notify.notify_one();
        seq
    }

    /// Pop the highest-priority oldest job, if any. The lock is held only
    /// for the pop; execution happens at the caller.
    pub fn dequeue(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        inner.high.pop_front().or_else(|| inner.low.pop_front())
    }

    /// Signal handle the worker waits on.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all queued-but-not-started jobs, returning how many were
    /// dropped. Used at shutdown; job loss here is accepted by design of the
    /// in-memory queue.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.len();
        inner.high.clear();
        inner.low.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(queue: &JobQueue, context: &str, priority: Priority) -> u64 {
        queue.enqueue(context, priority, |_| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_dequeue_prefers_high_then_fifo() {
        let queue = JobQueue::new();
        noop(&queue, "a", Priority::Low);
        noop(&queue, "b", Priority::High);
        noop(&queue, "c", Priority::Low);
        noop(&queue, "d", Priority::High);

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|j| j.context)
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[tokio::test]
    async fn test_dequeue_empty_is_none() {
        let queue = JobQueue::new();
        assert!(queue.dequeue().is_none());
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase() {
        let queue = JobQueue::new();
        let first = noop(&queue, "a", Priority::High);
        let second = noop(&queue, "b", Priority::High);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_clear_discards_pending_jobs() {
        let queue = JobQueue::new();
        noop(&queue, "a", Priority::Low);
        noop(&queue, "b", Priority::High);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_wakes_a_waiting_consumer() {
        let queue = Arc::new(JobQueue::new());
        let notifier = queue.notifier();

        let waiter = tokio::spawn(async move { notifier.notified().await });
        tokio::task::yield_now().await;

        noop(&queue, "wake", Priority::High);
        waiter.await.unwrap();
    }
}
