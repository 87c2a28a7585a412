//! Prioritized, resumable units of async work.
//!
//! A [`Task`] is a cheap, cloneable handle. All clones share one key, one
//! status cell and one completion broker, so `run()` may be awaited from many
//! places at once and every caller sees the same outcome.

mod builder;
mod exec_info;
mod job;
mod lifecycle;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;

use ptask_core::TaskError;

use crate::broker::{CompletionBroker, ResultHandle};
use crate::registry::QueueRegistry;
use crate::runner::Scheduler;
use crate::types::{Priority, TaskKey, TaskStatus};

pub use builder::TaskBuilder;
pub use exec_info::ExecInfo;

/// Boxed async work function.
pub type WorkFn<A, R> =
    Box<dyn Fn(A, ExecInfo) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

/// Computes the arguments for the next attempt from the current ones and the
/// result accumulated so far.
pub type ArgsHook<A, R> = Box<dyn Fn(&A, Option<&R>) -> A + Send + Sync>;

pub type CancelHook = Box<dyn Fn() + Send + Sync>;

/// Folds a new (partial or final) result into the accumulated one.
pub type MergeFn<R> = Box<dyn Fn(Option<&R>, R) -> R + Send + Sync>;

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

fn next_key() -> TaskKey {
    NEXT_KEY.fetch_add(1, Ordering::Relaxed)
}

/// Result of [`Task::cancel`]. Cancellation never fails loudly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub success: bool,
    pub message: String,
}

impl CancelOutcome {
    fn canceled() -> Self {
        Self {
            success: true,
            message: "Successfully canceled".into(),
        }
    }

    fn already_canceled() -> Self {
        Self {
            success: true,
            message: "Already canceled".into(),
        }
    }

    fn failed(reason: impl ToString) -> Self {
        Self {
            success: false,
            message: reason.to_string(),
        }
    }
}

pub(crate) struct Hooks<A, R> {
    pub(crate) on_pause: ArgsHook<A, R>,
    pub(crate) on_resume: ArgsHook<A, R>,
    pub(crate) on_cancel: CancelHook,
    pub(crate) results_merge: MergeFn<R>,
}

/// Arguments for the next attempt and what earlier attempts produced.
pub(crate) struct Progress<A, R> {
    pub(crate) args: A,
    pub(crate) result_so_far: Option<R>,
}

/// Snapshots of paused attempts, folded into `result_so_far` in the order
/// the attempts were detached.
pub(crate) struct Snapshots<R> {
    next_ticket: u64,
    /// Every ticket below this one has been merged or recorded as failed.
    merged: u64,
    waiting: VecDeque<(u64, ResultHandle<R>)>,
    failed: HashMap<u64, TaskError>,
}

impl<R> Snapshots<R> {
    pub(crate) fn new() -> Self {
        Self {
            next_ticket: 0,
            merged: 0,
            waiting: VecDeque::new(),
            failed: HashMap::new(),
        }
    }

    /// Queue `handle` behind every earlier snapshot and return its ticket.
    fn issue(&mut self, handle: ResultHandle<R>) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiting.push_back((ticket, handle));
        ticket
    }
}

pub(crate) struct TaskInner<A, R> {
    pub(crate) key: TaskKey,
    pub(crate) queue: String,
    pub(crate) priority: Mutex<Priority>,
    pub(crate) progress: Mutex<Progress<A, R>>,
    pub(crate) status: watch::Sender<TaskStatus>,
    /// Earliest moment `run()` may first enqueue the task.
    pub(crate) not_before: Option<Instant>,
    pub(crate) work: WorkFn<A, R>,
    pub(crate) hooks: Hooks<A, R>,
    pub(crate) broker: CompletionBroker<R>,
    pub(crate) snapshots: Mutex<Snapshots<R>>,
    /// Held while a pauser drains `snapshots`.
    pub(crate) merge_turn: tokio::sync::Mutex<()>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) registry: QueueRegistry,
}

/// A prioritized unit of async work bound to one queue.
pub struct Task<A, R> {
    inner: Arc<TaskInner<A, R>>,
}

impl<A, R> Clone for Task<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> std::fmt::Debug for Task<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.inner.key)
            .field("queue", &self.inner.queue)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}
