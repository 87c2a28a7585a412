use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::broker::Channel;
use crate::job::{Job, Settlement};
use crate::types::{TaskKey, TaskStatus};

use super::core::RunningAttempt;
use super::Scheduler;

impl Scheduler {
    /// Defer an admission pass to the next runtime tick.
    ///
    /// Requests made before the pass runs coalesce into it.
    pub(crate) fn schedule_pass(self: &Arc<Self>) {
        {
            let mut state = self.lock_state();
            if state.pass_scheduled {
                return;
            }
            state.pass_scheduled = true;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let scheduler = Arc::clone(self);
                handle.spawn(async move {
                    scheduler.process();
                });
            }
            Err(_) => {
                // Outside a runtime; the next enqueue or resume retries.
                self.lock_state().pass_scheduled = false;
                debug!(queue = %self.name, "no runtime, admission pass skipped");
            }
        }
    }

    /// Admit pending tasks until the concurrency limit is reached.
    pub(crate) fn process(self: &Arc<Self>) {
        let admitted = {
            let mut state = self.lock_state();
            state.pass_scheduled = false;

            let mut admitted = Vec::new();
            while state.in_flight < state.concurrency_limit {
                let Some(job) = state.pending.pop() else {
                    break;
                };
                let attempt = state.next_attempt;
                state.next_attempt += 1;
                state.in_flight += 1;
                state.metrics.record_start();

                job.transition(TaskStatus::Pending, TaskStatus::Running);
                state.running.insert(
                    job.key(),
                    RunningAttempt {
                        job: Arc::clone(&job),
                        attempt,
                    },
                );
                admitted.push((job, attempt));
            }
            admitted
        };

        for (job, attempt) in admitted {
            self.launch(job, attempt);
        }
    }

    /// Run one attempt of `job` on the runtime and route its outcome.
    fn launch(self: &Arc<Self>, job: Arc<dyn Job>, attempt: u64) {
        let key = job.key();
        debug!(queue = %self.name, task_key = key, attempt, "attempt started");

        let started = Instant::now();
        let work = job.start();
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let settlement = work.await;
            scheduler.finish_attempt(key, attempt, settlement, started.elapsed());
        });
    }

    /// Retire an attempt and free its slot.
    ///
    /// An attempt still registered in `running` produced the task's true
    /// outcome and settles the eventual channel. One that pause or abort
    /// detached settles the immediate channel instead.
    fn finish_attempt(
        self: &Arc<Self>,
        key: TaskKey,
        attempt: u64,
        settlement: Settlement,
        elapsed: Duration,
    ) {
        let channel = {
            let mut state = self.lock_state();
            let owned = state
                .running
                .get(&key)
                .is_some_and(|running| running.attempt == attempt);

            let channel = if owned {
                if let Some(running) = state.running.remove(&key) {
                    running.job.set_status(TaskStatus::Completed);
                }
                Channel::Eventual
            } else {
                Channel::Immediate(attempt)
            };

            state.in_flight = state.in_flight.saturating_sub(1);
            state
                .metrics
                .record_attempt(channel, settlement.failed(), elapsed);
            channel
        };

        if settlement.failed() && channel == Channel::Eventual {
            warn!(queue = %self.name, task_key = key, attempt, "task failed");
        } else {
            debug!(queue = %self.name, task_key = key, attempt, ?channel, "attempt settled");
        }

        settlement.deliver(channel);
        self.process();
    }
}
