//! Prioritized, pausable task scheduling over named queues.
//!
//! A [`Task`] wraps an async work function with a priority and lifecycle
//! hooks. Each named queue is served by one [`Scheduler`] that admits the
//! highest-priority pending task whenever a concurrency slot is free. Running
//! work can be paused (its partial result is kept and merged later), resumed,
//! canceled while pending, or aborted.

pub mod broker;
mod job;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod task;
pub mod types;

mod sync;

pub use broker::{Channel, CompletionBroker, ResultHandle};
pub use metrics::{QueueMetrics, QueueStats};
pub use ptask_core::{SchedulerConfig, TaskError};
pub use registry::QueueRegistry;
pub use runner::Scheduler;
pub use task::{CancelOutcome, ExecInfo, Task, TaskBuilder};
pub use types::{Priority, TaskInfo, TaskKey, TaskStatus};
