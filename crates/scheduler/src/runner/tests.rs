#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use ptask_core::TaskError;
    use tokio::sync::watch;

    use crate::broker::{Channel, CompletionBroker, ResultHandle};
    use crate::job::{Job, Settlement};
    use crate::runner::Scheduler;
    use crate::task::ExecInfo;
    use crate::types::{Priority, TaskInfo, TaskKey, TaskStatus};

    const TIMEOUT: Duration = Duration::from_secs(5);

    type StartLog = Arc<Mutex<Vec<TaskKey>>>;

    /// Job whose attempts block until the shared gate opens or the job is
    /// interrupted, then return their own key.
    struct MockJob {
        key: TaskKey,
        priority: Mutex<Priority>,
        status: watch::Sender<TaskStatus>,
        broker: CompletionBroker<TaskKey>,
        gate: watch::Receiver<bool>,
        started: StartLog,
        fail: bool,
    }

    impl MockJob {
        fn set_priority(&self, priority: f64) {
            *self.priority.lock().unwrap() = priority.into();
        }
    }

    impl Job for MockJob {
        fn key(&self) -> TaskKey {
            self.key
        }

        fn queue(&self) -> &str {
            "test"
        }

        fn priority(&self) -> Priority {
            self.priority.lock().unwrap().clone()
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
            self.started.lock().unwrap().push(self.key);
            let exec = ExecInfo::new(self.status.subscribe());
            let mut gate = self.gate.clone();
            async move {
                tokio::select! {
                    _ = gate.wait_for(|open| *open) => {}
                    _ = exec.interrupted() => {}
                }
                let outcome = if self.fail {
                    Err(TaskError::from(anyhow::anyhow!("boom")))
                } else {
                    Ok(self.key)
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
                queue: "test".into(),
                priority: Job::priority(self).value(),
                status: Job::status(self),
            }
        }
    }

    struct Harness {
        scheduler: Arc<Scheduler>,
        gate: watch::Sender<bool>,
        started: StartLog,
    }

    impl Harness {
        fn new(limit: usize) -> Self {
            let (gate, _) = watch::channel(false);
            Self {
                scheduler: Scheduler::new("test", limit),
                gate,
                started: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn job(&self, key: TaskKey, priority: f64) -> Arc<MockJob> {
            let (status, _) = watch::channel(TaskStatus::Pending);
            Arc::new(MockJob {
                key,
                priority: Mutex::new(priority.into()),
                status,
                broker: CompletionBroker::new(),
                gate: self.gate.subscribe(),
                started: Arc::clone(&self.started),
                fail: false,
            })
        }

        /// Enqueue `job` and hand back its eventual outcome.
        fn enqueue(&self, job: &Arc<MockJob>) -> ResultHandle<TaskKey> {
            let outcome = job.broker.subscribe(Channel::Eventual);
            self.scheduler
                .enqueue(Arc::clone(job) as Arc<dyn Job>)
                .unwrap();
            outcome
        }

        fn open_gate(&self) {
            self.gate.send_replace(true);
        }

        fn started(&self) -> Vec<TaskKey> {
            self.started.lock().unwrap().clone()
        }
    }

    /// Let spawned admission passes and attempts make progress.
    async fn tick() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn outcome(handle: ResultHandle<TaskKey>) -> Result<TaskKey, TaskError> {
        tokio::time::timeout(TIMEOUT, handle).await.expect("timed out")
    }

    #[tokio::test]
    async fn admits_highest_priority_first() {
        let h = Harness::new(1);
        let low = h.job(1, 1.0);
        let high = h.job(2, 5.0);
        let mid = h.job(3, 3.0);

        let handles = vec![h.enqueue(&low), h.enqueue(&high), h.enqueue(&mid)];
        h.open_gate();
        for handle in handles {
            outcome(handle).await.unwrap();
        }

        assert_eq!(h.started(), vec![2, 3, 1]);
        assert_eq!(high.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn concurrency_limit_bounds_in_flight() {
        let h = Harness::new(2);
        let jobs: Vec<_> = (0..4).map(|key| h.job(key, 0.0)).collect();
        let handles: Vec<_> = jobs.iter().map(|job| h.enqueue(job)).collect();
        tick().await;

        let stats = h.scheduler.stats();
        assert_eq!(stats.running, 2);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(stats.pending, 2);

        h.open_gate();
        for handle in handles {
            outcome(handle).await.unwrap();
        }
        tick().await;

        let stats = h.scheduler.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.metrics.attempts_started, 4);
        assert_eq!(stats.metrics.completed, 4);
    }

    #[tokio::test]
    async fn reprioritize_moves_pending_task() {
        let h = Harness::new(1);
        let blocker = h.job(0, 10.0);
        let a = h.job(1, 1.0);
        let b = h.job(2, 2.0);

        let handles = vec![h.enqueue(&blocker), h.enqueue(&a), h.enqueue(&b)];
        tick().await;
        assert_eq!(h.started(), vec![0]);

        a.set_priority(5.0);
        assert!(h.scheduler.reprioritize(a.key));
        // Running tasks have no queue position to change.
        blocker.set_priority(0.0);
        assert!(!h.scheduler.reprioritize(blocker.key));

        h.open_gate();
        for handle in handles {
            outcome(handle).await.unwrap();
        }
        assert_eq!(h.started(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn pause_running_settles_immediate_only() {
        let h = Harness::new(1);
        let job = h.job(7, 0.0);
        let mut eventual = h.enqueue(&job);
        tick().await;
        assert_eq!(job.status(), TaskStatus::Running);

        let snapshot = h
            .scheduler
            .pause(job.key, |attempt| job.broker.subscribe(Channel::Immediate(attempt)))
            .unwrap()
            .expect("task was running");
        assert_eq!(job.status(), TaskStatus::Paused);

        assert_eq!(outcome(snapshot).await.unwrap(), 7);
        assert!(futures::poll!(&mut eventual).is_pending());

        tick().await;
        let stats = h.scheduler.stats();
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.metrics.interrupted, 1);

        assert!(h.scheduler.resume(job.key));
        tick().await;
        assert_eq!(job.status(), TaskStatus::Running);

        h.open_gate();
        assert_eq!(outcome(eventual).await.unwrap(), 7);
        assert_eq!(h.started(), vec![7, 7]);
    }

    #[tokio::test]
    async fn each_pause_detaches_its_own_attempt() {
        let h = Harness::new(2);
        let job = h.job(5, 0.0);
        let _eventual = h.enqueue(&job);
        tick().await;

        let detach = |attempt| (attempt, job.broker.subscribe(Channel::Immediate(attempt)));
        let (first, first_snapshot) = h.scheduler.pause(job.key, detach).unwrap().expect("task was running");
        tick().await;
        assert_eq!(outcome(first_snapshot).await.unwrap(), 5);

        assert!(h.scheduler.resume(job.key));
        tick().await;
        assert_eq!(job.status(), TaskStatus::Running);

        let (second, second_snapshot) = h.scheduler.pause(job.key, detach).unwrap().expect("task was running");
        assert_ne!(first, second);
        assert_eq!(outcome(second_snapshot).await.unwrap(), 5);

        tick().await;
        assert_eq!(h.scheduler.stats().metrics.interrupted, 2);
        assert_eq!(h.started(), vec![5, 5]);
    }

    #[tokio::test]
    async fn pause_frees_slot_for_next_task() {
        let h = Harness::new(1);
        let first = h.job(1, 2.0);
        let second = h.job(2, 1.0);
        let _first_outcome = h.enqueue(&first);
        let _second_outcome = h.enqueue(&second);
        tick().await;
        assert_eq!(h.started(), vec![1]);

        h.scheduler.pause(first.key, |_| ()).unwrap();
        tick().await;
        assert_eq!(h.started(), vec![1, 2]);
        assert_eq!(second.status(), TaskStatus::Running);
    }

    #[tokio::test]
    async fn pause_pending_task() {
        let h = Harness::new(1);
        let blocker = h.job(0, 9.0);
        let waiting = h.job(1, 0.0);
        let _blocker_outcome = h.enqueue(&blocker);
        let _waiting_outcome = h.enqueue(&waiting);
        tick().await;

        let detached = h.scheduler.pause(waiting.key, |attempt| attempt).unwrap();
        assert!(detached.is_none());
        assert_eq!(waiting.status(), TaskStatus::Paused);

        let stats = h.scheduler.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.paused, 1);
    }

    #[tokio::test]
    async fn pause_unknown_task_fails() {
        let h = Harness::new(1);
        let err = h.scheduler.pause(42, |_| ()).unwrap_err();
        assert_eq!(err.to_string(), "Cannot pause a task that is not running");
        assert!(!h.scheduler.resume(42));
    }

    #[tokio::test]
    async fn cancel_pending_rejects_waiters() {
        let h = Harness::new(1);
        let blocker = h.job(0, 9.0);
        let doomed = h.job(1, 0.0);
        let _blocker_outcome = h.enqueue(&blocker);
        let eventual = h.enqueue(&doomed);
        tick().await;

        h.scheduler.cancel(doomed.key).unwrap();
        assert_eq!(doomed.status(), TaskStatus::Canceled);
        assert!(matches!(outcome(eventual).await, Err(TaskError::Canceled)));
        assert!(h.scheduler.pending_tasks().is_empty());

        assert!(matches!(h.scheduler.cancel(doomed.key), Err(TaskError::NotFound)));
        let requeue = h.scheduler.enqueue(Arc::clone(&doomed) as Arc<dyn Job>);
        assert!(matches!(requeue, Err(TaskError::Canceled)));
    }

    #[tokio::test]
    async fn cancel_running_task_is_refused() {
        let h = Harness::new(1);
        let job = h.job(3, 0.0);
        let _outcome = h.enqueue(&job);
        tick().await;

        assert!(matches!(h.scheduler.cancel(job.key), Err(TaskError::NotFound)));
        assert_eq!(job.status(), TaskStatus::Running);
    }

    #[tokio::test]
    async fn abort_running_waits_for_exit() {
        let h = Harness::new(1);
        let job = h.job(1, 1.0);
        let next = h.job(2, 0.0);
        let eventual = h.enqueue(&job);
        let _next_outcome = h.enqueue(&next);
        tick().await;

        tokio::time::timeout(TIMEOUT, h.scheduler.abort(job.key))
            .await
            .expect("timed out")
            .unwrap();

        assert_eq!(job.status(), TaskStatus::Canceled);
        let err = outcome(eventual).await.unwrap_err();
        assert_eq!(err.to_string(), "Running task aborted");

        tick().await;
        assert_eq!(h.started(), vec![1, 2]);
        assert_eq!(h.scheduler.stats().in_flight, 1);
    }

    #[tokio::test]
    async fn abort_paused_task() {
        let h = Harness::new(1);
        let job = h.job(1, 0.0);
        let eventual = h.enqueue(&job);
        tick().await;

        let snapshot = h
            .scheduler
            .pause(job.key, |attempt| job.broker.subscribe(Channel::Immediate(attempt)))
            .unwrap()
            .expect("task was running");
        outcome(snapshot).await.unwrap();

        h.scheduler.abort(job.key).await.unwrap();
        assert!(matches!(outcome(eventual).await, Err(TaskError::PausedAborted)));
        assert_eq!(h.scheduler.stats().paused, 0);
    }

    #[tokio::test]
    async fn abort_pending_task_fails() {
        let h = Harness::new(1);
        let blocker = h.job(0, 9.0);
        let waiting = h.job(1, 0.0);
        let _blocker_outcome = h.enqueue(&blocker);
        let _waiting_outcome = h.enqueue(&waiting);
        tick().await;

        let err = h.scheduler.abort(waiting.key).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot abort a task that is not running");
        assert_eq!(waiting.status(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn raising_limit_admits_more() {
        let h = Harness::new(1);
        let jobs: Vec<_> = (0..3).map(|key| h.job(key, 0.0)).collect();
        let _handles: Vec<_> = jobs.iter().map(|job| h.enqueue(job)).collect();
        tick().await;
        assert_eq!(h.scheduler.stats().running, 1);

        h.scheduler.set_concurrency_limit(3);
        tick().await;
        assert_eq!(h.scheduler.stats().running, 3);
        assert_eq!(h.scheduler.concurrency_limit(), 3);
    }

    #[tokio::test]
    async fn lowering_limit_keeps_running_work() {
        let h = Harness::new(2);
        let jobs: Vec<_> = (0..3).map(|key| h.job(key, 0.0)).collect();
        let _handles: Vec<_> = jobs.iter().map(|job| h.enqueue(job)).collect();
        tick().await;

        h.scheduler.set_concurrency_limit(1);
        tick().await;
        let stats = h.scheduler.stats();
        assert_eq!(stats.running, 2);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn duplicate_enqueue_keeps_one_entry() {
        let h = Harness::new(1);
        let blocker = h.job(0, 9.0);
        let job = h.job(1, 0.0);
        let _blocker_outcome = h.enqueue(&blocker);
        let first = h.enqueue(&job);
        let second = h.enqueue(&job);
        tick().await;
        assert_eq!(h.scheduler.stats().pending, 1);

        h.open_gate();
        assert_eq!(outcome(first).await.unwrap(), 1);
        assert_eq!(outcome(second).await.unwrap(), 1);
        assert_eq!(h.started(), vec![0, 1]);
    }

    #[tokio::test]
    async fn completed_job_runs_again() {
        let h = Harness::new(1);
        h.open_gate();
        let job = h.job(4, 0.0);

        outcome(h.enqueue(&job)).await.unwrap();
        assert_eq!(job.status(), TaskStatus::Completed);

        outcome(h.enqueue(&job)).await.unwrap();
        assert_eq!(h.started(), vec![4, 4]);
    }

    #[tokio::test]
    async fn failed_attempt_settles_error() {
        let h = Harness::new(1);
        h.open_gate();
        let (status, _) = watch::channel(TaskStatus::Pending);
        let job = Arc::new(MockJob {
            key: 9,
            priority: Mutex::new(Priority::default()),
            status,
            broker: CompletionBroker::new(),
            gate: h.gate.subscribe(),
            started: Arc::clone(&h.started),
            fail: true,
        });

        let err = outcome(h.enqueue(&job)).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");

        tick().await;
        let metrics = h.scheduler.stats().metrics;
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.completed, 0);
    }

    #[tokio::test]
    async fn pending_tasks_lists_in_key_order() {
        let h = Harness::new(1);
        let blocker = h.job(0, 9.0);
        let b = h.job(5, 1.0);
        let a = h.job(3, 2.0);
        let _handles = vec![h.enqueue(&blocker), h.enqueue(&b), h.enqueue(&a)];
        tick().await;

        let keys: Vec<TaskKey> = h.scheduler.pending_tasks().iter().map(|t| t.key).collect();
        assert_eq!(keys, vec![3, 5]);
    }
}
