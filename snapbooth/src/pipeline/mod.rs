//! Export job pipeline.
//!
//! Side-effecting jobs (typically "copy a file onto the selected removable
//! volume") are issued by external events and serialized onto exactly one
//! worker, so concurrent triggers can never interleave partial writes on the
//! same destination. Latency-sensitive jobs jump ahead of background ones
//! via a two-class priority queue.

mod job_queue;
mod worker;

pub use job_queue::{Job, JobQueue, JobQueueConfig, Priority};
pub use worker::ExportWorker;
