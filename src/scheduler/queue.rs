//! Queue types for the scheduler

use std::cmp::Ordering;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::domain::Priority;

use super::job::Task;

/// Identifier of a submitted job, unique per limiter
///
/// Ids are handed out in submission order, so they double as the FIFO
/// tie-break between jobs of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A job waiting for a token
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) priority: Priority,
    pub(crate) submitted_at: Instant,
    pub(crate) task: Box<dyn Task>,
}

impl QueuedJob {
    pub(crate) fn new(id: JobId, priority: Priority, submitted_at: Instant, task: Box<dyn Task>) -> Self {
        Self {
            id,
            priority,
            submitted_at,
            task,
        }
    }
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

impl Eq for QueuedJob {}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission
        self.priority.cmp(&other.priority).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The job currently past dispatch and not yet settled
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlight {
    pub(crate) id: JobId,
    pub(crate) priority: Priority,
    pub(crate) dispatched_at: Instant,
}

/// Counters for one limiter
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    /// Jobs accepted into the queue
    pub total_scheduled: u64,
    /// Jobs that took a token and started
    pub total_dispatched: u64,
    /// Dispatched jobs that ran to completion (their own output may still be an error)
    pub total_completed: u64,
    /// Dispatched jobs that panicked
    pub total_panicked: u64,
    /// Queued jobs removed by `cancel`
    pub total_cancelled: u64,
    /// Jobs refused or dropped from the queue by shutdown or a fault
    pub total_rejected: u64,
    pub peak_queue_depth: usize,
    /// Sum of queue wait (submission to dispatch) over dispatched jobs
    pub total_wait_time_ms: u64,
}

impl LimiterStats {
    /// Mean time a dispatched job spent queued
    pub fn average_wait(&self) -> Duration {
        if self.total_dispatched == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_wait_time_ms / self.total_dispatched)
    }
}

/// Point-in-time view of a limiter
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub queued: usize,
    pub in_flight: Option<JobId>,
    pub processing: bool,
    pub closed: bool,
    pub faulted: bool,
    /// Tokens available right now
    pub tokens: f64,
    /// How long the oldest queued job has been waiting
    pub oldest_wait: Option<Duration>,
    pub stats: LimiterStats,
}

/// One row of `queue_details`
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: JobId,
    pub priority: Priority,
    pub status: QueueEntryStatus,
    /// Time queued, or time since dispatch for the running job
    pub wait_time: Duration,
}

/// Status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEntryStatus {
    Running,
    Queued,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::error::SchedulerError;
    use crate::scheduler::job::Outcome;
    use futures::future::BoxFuture;
    use proptest::prelude::*;
    use std::collections::BinaryHeap;

    struct NoopTask;

    impl Task for NoopTask {
        fn run(self: Box<Self>, _id: JobId) -> BoxFuture<'static, Outcome> {
            Box::pin(async { Outcome::Completed })
        }

        fn reject(self: Box<Self>, _err: SchedulerError) {}
    }

    fn job(id: u64, priority: i32) -> QueuedJob {
        QueuedJob::new(JobId(id), Priority(priority), Instant::now(), Box::new(NoopTask))
    }

    #[test]
    fn test_queued_job_ordering() {
        let high = job(3, 10);
        let normal = job(1, 0);
        let low = job(2, -10);

        // Higher priority should come first
        assert!(high > normal);
        assert!(normal > low);
    }

    #[test]
    fn test_queued_job_same_priority_fifo() {
        let first = job(1, 0);
        let second = job(2, 0);

        // Earlier submission should come first (so it's "greater" in the heap)
        assert!(first > second);
    }

    #[test]
    fn test_queued_job_equality() {
        // Same id means equal
        assert_eq!(job(4, 0), job(4, 5));
    }

    #[test]
    fn test_heap_pop_order() {
        let mut heap: BinaryHeap<QueuedJob> = [job(1, 0), job(2, 1), job(3, 0), job(4, 5), job(5, 1)]
            .into_iter()
            .collect();

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|j| j.id.0).collect();
        assert_eq!(order, vec![4, 2, 5, 1, 3]);
    }

    #[test]
    fn test_average_wait() {
        let stats = LimiterStats {
            total_dispatched: 4,
            total_wait_time_ms: 2000,
            ..Default::default()
        };
        assert_eq!(stats.average_wait(), Duration::from_millis(500));
        assert_eq!(LimiterStats::default().average_wait(), Duration::ZERO);
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(12).to_string(), "#12");
    }

    proptest! {
        #[test]
        fn prop_heap_pops_by_priority_then_submission(priorities in prop::collection::vec(-5i32..5, 0..64)) {
            let mut heap: BinaryHeap<QueuedJob> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| job(i as u64, *p))
                .collect();

            let popped: Vec<(i32, u64)> = std::iter::from_fn(|| heap.pop())
                .map(|j| (j.priority.0, j.id.0))
                .collect();

            let mut expected: Vec<(i32, u64)> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| (*p, i as u64))
                .collect();
            expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            prop_assert_eq!(popped, expected);
        }
    }
}
