use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broker::Channel;

/// Per-queue execution counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueMetrics {
    /// Attempts admitted by the loop.
    pub attempts_started: u64,
    /// Attempts that settled the task's eventual outcome successfully.
    pub completed: u64,
    /// Attempts that settled the task's eventual outcome with an error.
    pub failed: u64,
    /// Attempts that exited after being paused or aborted.
    pub interrupted: u64,
    /// Rolling average attempt duration, all outcomes.
    pub avg_attempt_duration: Duration,
    /// Last eventual settlement.
    pub last_completed: Option<DateTime<Utc>>,
}

impl QueueMetrics {
    pub fn record_start(&mut self) {
        self.attempts_started += 1;
    }

    /// Record an attempt that settled on `channel`.
    pub fn record_attempt(&mut self, channel: Channel, failed: bool, duration: Duration) {
        match channel {
            Channel::Immediate(_) => self.interrupted += 1,
            Channel::Eventual => {
                if failed {
                    self.failed += 1;
                } else {
                    self.completed += 1;
                }
                self.last_completed = Some(Utc::now());
            }
        }

        let count = self.completed + self.failed + self.interrupted;

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_attempt_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_attempt_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub pending: usize,
    pub running: usize,
    pub paused: usize,
    pub in_flight: usize,
    pub concurrency_limit: usize,
    pub metrics: QueueMetrics,
}
