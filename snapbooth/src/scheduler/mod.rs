//! Periodic task scheduling.
//!
//! The scheduler runs a small, fixed set of named recurring callbacks on a
//! shared clock. A short driver tick selects due tasks under one lock and
//! dispatches them independently, so a slow task never delays the clock or
//! its peers, and a task never overlaps a still-running invocation of
//! itself.

mod service;
mod task;

pub use service::{Scheduler, SchedulerConfig};
pub use task::{ScheduledTask, TaskAction};
