use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use ptask_core::TaskError;

use crate::broker::Channel;
use crate::job::{Job, Settlement};
use crate::sync::lock;
use crate::types::{Priority, TaskInfo, TaskKey, TaskStatus};

use super::{ExecInfo, TaskInner};

impl<A, R> Job for TaskInner<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn key(&self) -> TaskKey {
        self.key
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn priority(&self) -> Priority {
        lock(&self.priority).clone()
    }

    fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: TaskStatus) {
        self.status.send_replace(status);
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    fn start(self: Arc<Self>) -> BoxFuture<'static, Settlement> {
        let args = lock(&self.progress).args.clone();
        let exec = ExecInfo::new(self.status.subscribe());
        let work = (self.work)(args, exec);

        async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result.map_err(TaskError::from),
                Err(_) => Err(TaskError::from(anyhow::anyhow!("work function panicked"))),
            };
            Settlement::new(outcome.is_err(), move |channel| {
                self.broker.settle(channel, outcome);
            })
        }
        .boxed()
    }

    fn reject(&self, error: TaskError) {
        self.broker.reject_all(error);
    }

    fn attempt_exit(&self, attempt: u64) -> BoxFuture<'static, ()> {
        let exit = self.broker.subscribe(Channel::Immediate(attempt));
        async move {
            let _ = exit.await;
        }
        .boxed()
    }

    fn info(&self) -> TaskInfo {
        TaskInfo {
            key: self.key,
            queue: self.queue.clone(),
            priority: Job::priority(self).value(),
            status: Job::status(self),
        }
    }
}
