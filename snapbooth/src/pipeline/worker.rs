//! The single export worker.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job_queue::JobQueue;
use crate::status::StatusBoard;

/// Drains the job queue one job at a time.
///
/// Exactly one job executes at any moment, so jobs touching the same
/// destination (the selected removable volume) cannot interleave partial
/// writes. A job's failure is logged and reported as a removable-storage
/// fault on the status board; it never crashes the worker.
pub struct ExportWorker {
    queue: Arc<JobQueue>,
    status: StatusBoard,
    cancellation_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExportWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        status: StatusBoard,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            status,
            cancellation_token,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the worker loop. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("export worker already started");
            return;
        }

        let queue = self.queue.clone();
        let status = self.status.clone();
        let token = self.cancellation_token.clone();

        *handle = Some(tokio::spawn(async move {
            run_worker(queue, status, token).await;
        }));
    }

    /// Wait for the worker to observe cancellation and exit. Pending jobs
    /// are discarded.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            info!(dropped, "discarded pending export jobs at shutdown");
        }
    }
}

async fn run_worker(queue: Arc<JobQueue>, status: StatusBoard, token: CancellationToken) {
    let notifier = queue.notifier();
    debug!("export worker started");

    loop {
        if token.is_cancelled() {
            break;
        }

        let Some(job) = queue.dequeue() else {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,
                _ = notifier.notified() => {}
            }
            continue;
        };

        let context = job.context.clone();
        debug!(context = %context, seq = job.seq, "executing export job");

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!(context = %context, "export job abandoned by shutdown");
                break;
            }
            result = job.run(token.clone()) => match result {
                Ok(()) => {
                    debug!(context = %context, "export job completed");
                    status.record_export_completed();
                }
                Err(e) => {
                    warn!(context = %context, error = %e, "export job failed");
                    status.report_volume_fault(format!("cannot reach USB: {context}: {e}"));
                }
            },
        }
    }

    debug!("export worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Priority;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn record_order(
        queue: &JobQueue,
        log: &Arc<parking_lot::Mutex<Vec<String>>>,
        context: &str,
        priority: Priority,
    ) {
        let log = log.clone();
        let name = context.to_string();
        queue.enqueue(context, priority, move |_| async move {
            log.lock().push(name);
            Ok(())
        });
    }

    async fn settle() {
        // The worker runs on real time here; give it a moment to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_high_jobs_run_before_pending_low_jobs() {
        let queue = Arc::new(JobQueue::new());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        // Enqueue before the worker starts so all three are pending at once.
        record_order(&queue, &log, "a", Priority::Low);
        record_order(&queue, &log, "b", Priority::High);
        record_order(&queue, &log, "c", Priority::Low);

        let token = CancellationToken::new();
        let worker = ExportWorker::new(queue.clone(), StatusBoard::new(), token);
        worker.start();
        settle().await;

        assert_eq!(*log.lock(), vec!["b", "a", "c"]);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_failed_job_reports_fault_and_worker_survives() {
        let queue = Arc::new(JobQueue::new());
        let status = StatusBoard::new();
        let token = CancellationToken::new();
        let worker = ExportWorker::new(queue.clone(), status.clone(), token);
        worker.start();

        queue.enqueue("doomed", Priority::High, |_| async {
            Err(crate::Error::other("disk on fire"))
        });
        settle().await;

        assert!(!status.is_hardware_healthy());
        assert!(status.health_message().contains("cannot reach USB"));

        // The worker is still alive and processes the next job.
        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = done.clone();
        queue.enqueue("next", Priority::High, move |_| async move {
            done_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        settle().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_successful_job_bumps_export_counter() {
        let queue = Arc::new(JobQueue::new());
        let status = StatusBoard::new();
        let token = CancellationToken::new();
        let worker = ExportWorker::new(queue.clone(), status.clone(), token);
        worker.start();

        queue.enqueue("export", Priority::High, |_| async { Ok(()) });
        settle().await;

        assert_eq!(status.usage().exports_completed, 1);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_stop_discards_pending_jobs() {
        let queue = Arc::new(JobQueue::new());
        let token = CancellationToken::new();
        let worker = ExportWorker::new(queue.clone(), StatusBoard::new(), token.clone());
        worker.start();

        // A job that holds the worker until cancellation.
        queue.enqueue("blocker", Priority::High, |job_token| async move {
            job_token.cancelled().await;
            Ok(())
        });
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        queue.enqueue("never", Priority::Low, move |_| async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        settle().await;

        worker.stop().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_at_most_one_job_executes_at_a_time() {
        let queue = Arc::new(JobQueue::new());
        let token = CancellationToken::new();
        let worker = ExportWorker::new(queue.clone(), StatusBoard::new(), token);

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let (active, peak) = (active.clone(), peak.clone());
            queue.enqueue(format!("job-{i}"), Priority::High, move |_| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }

        worker.start();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        worker.stop().await;
    }
}
