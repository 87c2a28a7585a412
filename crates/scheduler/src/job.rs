use std::sync::Arc;

use futures::future::BoxFuture;
use ptask_core::TaskError;

use crate::broker::Channel;
use crate::queue::Queued;
use crate::types::{Priority, TaskInfo, TaskKey, TaskStatus};

/// Scheduler-facing view of a task, erased over its argument and result types.
///
/// The scheduler owns status transitions and decides which broker channel an
/// attempt's outcome goes to; everything typed stays behind this trait.
pub(crate) trait Job: Send + Sync + 'static {
    fn key(&self) -> TaskKey;
    fn queue(&self) -> &str;
    fn priority(&self) -> Priority;
    fn status(&self) -> TaskStatus;
    fn set_status(&self, status: TaskStatus);

    /// Compare-and-set on the status cell.
    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool;

    /// Invoke the work function with the current arguments.
    fn start(self: Arc<Self>) -> BoxFuture<'static, Settlement>;

    /// Reject every waiter on every channel.
    fn reject(&self, error: TaskError);

    /// Subscribe to `attempt`'s snapshot now; resolves when that attempt
    /// exits.
    fn attempt_exit(&self, attempt: u64) -> BoxFuture<'static, ()>;

    fn info(&self) -> TaskInfo;
}

impl Queued for Arc<dyn Job> {
    fn key(&self) -> TaskKey {
        Job::key(self.as_ref())
    }

    fn priority(&self) -> Priority {
        Job::priority(self.as_ref())
    }
}

/// Outcome of one attempt, waiting for the scheduler to pick its channel.
pub(crate) struct Settlement {
    failed: bool,
    deliver: Box<dyn FnOnce(Channel) + Send>,
}

impl Settlement {
    pub(crate) fn new<F>(failed: bool, deliver: F) -> Self
    where
        F: FnOnce(Channel) + Send + 'static,
    {
        Self {
            failed,
            deliver: Box::new(deliver),
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn deliver(self, channel: Channel) {
        (self.deliver)(channel)
    }
}
