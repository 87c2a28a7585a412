use std::future::Future;
use std::sync::Arc;

use ptask_core::TaskError;
use tracing::{debug, info, warn};

use crate::broker::Channel;
use crate::job::Job;
use crate::sync::lock;
use crate::types::{Priority, TaskKey, TaskStatus};

use super::{CancelOutcome, ExecInfo, Task, TaskBuilder};

impl<A, R> Task<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Start describing a task that runs `work` with `args`.
    pub fn builder<F, Fut>(args: A, work: F) -> TaskBuilder<A, R>
    where
        F: Fn(A, ExecInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        TaskBuilder::new(args, work)
    }

    /// Schedule the task (once) and wait for its final outcome.
    ///
    /// Concurrent callers share one execution. The value returned is the
    /// final attempt's result merged into whatever paused attempts produced.
    pub async fn run(&self) -> Result<R, TaskError> {
        if let Some(not_before) = self.inner.not_before {
            tokio::time::sleep_until(not_before.into()).await;
        }

        let outcome = self.inner.broker.subscribe(Channel::Eventual);
        self.inner.registry.track(self.job());
        if let Err(err) = self.inner.scheduler.enqueue(self.job()) {
            self.untrack();
            return Err(err);
        }

        let result = outcome.await;
        self.untrack();

        let newest = result?;
        let progress = lock(&self.inner.progress);
        Ok((self.inner.hooks.results_merge)(progress.result_so_far.as_ref(), newest))
    }

    /// Take the task out of scheduling.
    ///
    /// If an attempt is executing this waits for it to notice the pause and
    /// exit, then folds its partial result into the accumulated one. Partial
    /// results are merged in the order their attempts were paused, even when
    /// a later attempt exits first. The `on_pause` hook then computes the
    /// arguments for the next attempt.
    pub async fn pause(&self) -> Result<(), TaskError> {
        if self.status() == TaskStatus::Paused {
            return Ok(());
        }

        let inner = &self.inner;
        let ticket = inner
            .scheduler
            .pause(inner.key, |attempt| {
                let snapshot = inner.broker.subscribe(Channel::Immediate(attempt));
                lock(&inner.snapshots).issue(snapshot)
            })
            .map_err(|err| {
                debug!(task_key = inner.key, %err, "pause refused");
                err
            })?;

        let through = match ticket {
            Some(ticket) => ticket + 1,
            None => lock(&inner.snapshots).next_ticket,
        };
        self.merge_snapshots(through).await;

        if let Some(ticket) = ticket {
            if let Some(err) = lock(&inner.snapshots).failed.remove(&ticket) {
                return Err(err);
            }
        }

        let mut progress = lock(&inner.progress);
        let next = (inner.hooks.on_pause)(&progress.args, progress.result_so_far.as_ref());
        progress.args = next;
        Ok(())
    }

    /// Merge queued snapshots until every ticket below `through` is done.
    async fn merge_snapshots(&self, through: u64) {
        let inner = &self.inner;
        let _turn = inner.merge_turn.lock().await;
        loop {
            let next = {
                let mut snapshots = lock(&inner.snapshots);
                if snapshots.merged >= through {
                    break;
                }
                snapshots.waiting.pop_front()
            };
            let Some((ticket, snapshot)) = next else {
                break;
            };

            let outcome = snapshot.await;
            let mut snapshots = lock(&inner.snapshots);
            match outcome {
                Ok(partial) => {
                    let mut progress = lock(&inner.progress);
                    let merged = (inner.hooks.results_merge)(progress.result_so_far.as_ref(), partial);
                    progress.result_so_far = Some(merged);
                }
                Err(err) => {
                    snapshots.failed.insert(ticket, err);
                }
            }
            snapshots.merged = ticket + 1;
        }
    }

    /// Put a paused task back in line. No-op unless paused.
    pub fn resume(&self) {
        if self.status() != TaskStatus::Paused {
            return;
        }

        {
            let mut progress = lock(&self.inner.progress);
            let next = (self.inner.hooks.on_resume)(&progress.args, progress.result_so_far.as_ref());
            progress.args = next;
        }
        self.inner.scheduler.resume(self.inner.key);
    }

    /// Cancel the task.
    ///
    /// Without `abort` only a pending task can be canceled. With `abort` a
    /// running or paused task is detached as well; for a running one this
    /// returns after its attempt has exited.
    pub async fn cancel(&self, abort: bool) -> CancelOutcome {
        if self.status() == TaskStatus::Canceled {
            return CancelOutcome::already_canceled();
        }

        let scheduler = &self.inner.scheduler;
        let result = match scheduler.cancel(self.inner.key) {
            Err(not_pending) if abort => match scheduler.abort(self.inner.key).await {
                Ok(()) => Ok(()),
                Err(refused) => {
                    debug!(task_key = self.inner.key, %refused, "abort refused");
                    Err(not_pending)
                }
            },
            removed => removed,
        };

        match result {
            Ok(()) => {
                (self.inner.hooks.on_cancel)();
                self.untrack();
                info!(task_key = self.inner.key, queue = %self.inner.queue, abort, "task canceled");
                CancelOutcome::canceled()
            }
            // Lost a race with another cancel.
            Err(_) if self.status() == TaskStatus::Canceled => CancelOutcome::already_canceled(),
            Err(err) => {
                warn!(task_key = self.inner.key, %err, abort, "cancel failed");
                CancelOutcome::failed(err)
            }
        }
    }

    /// Replace the priority. A pending task is re-positioned lazily; a
    /// running one keeps running and only later admissions see the change.
    pub fn set_priority(&self, priority: impl Into<Priority>) {
        *lock(&self.inner.priority) = priority.into();
        self.inner.scheduler.reprioritize(self.inner.key);
    }

    pub fn key(&self) -> TaskKey {
        self.inner.key
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Current numeric priority.
    pub fn priority(&self) -> f64 {
        lock(&self.inner.priority).value()
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.status.borrow()
    }

    /// Arguments the next attempt will receive.
    pub fn args(&self) -> A {
        lock(&self.inner.progress).args.clone()
    }

    /// Merged partial results of paused attempts.
    pub fn result_so_far(&self) -> Option<R> {
        lock(&self.inner.progress).result_so_far.clone()
    }

    /// A status handle like the one the work function receives.
    pub fn exec_info(&self) -> ExecInfo {
        ExecInfo::new(self.inner.status.subscribe())
    }

    pub(crate) fn job(&self) -> Arc<dyn Job> {
        self.inner.clone()
    }

    fn untrack(&self) {
        self.inner.registry.untrack(&self.inner.queue, self.inner.key);
    }
}
