//! Rate limiter implementation

use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::Priority;

use super::bucket::TokenBucket;
use super::config::LimiterConfig;
use super::error::SchedulerError;
use super::jitter::Jitter;
use super::job::{JobHandle, Outcome, Task, TypedTask, panic_message};
use super::queue::{InFlight, JobId, LimiterStats, QueueEntry, QueueEntryStatus, QueueState, QueuedJob};

/// Internal state protected by mutex
struct LimiterState {
    bucket: TokenBucket,

    /// Priority queue of waiting jobs
    queue: BinaryHeap<QueuedJob>,

    /// Job between dispatch and settlement
    in_flight: Option<InFlight>,

    /// True while a drain task is alive
    processing: bool,

    /// Set by `shutdown`
    closed: bool,

    /// Set when the drain task itself panicked
    faulted: bool,

    next_id: u64,

    stats: LimiterStats,
}

struct Shared {
    name: String,
    config: LimiterConfig,
    jitter: Jitter,
    state: Mutex<LimiterState>,
    wake: Notify,

    /// Makes the next drain iteration panic
    #[cfg(test)]
    fail_drain: std::sync::atomic::AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // Jobs never run under the lock, so a poisoned guard still holds consistent state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop scheduling after the drain task died
    fn fault(&self) {
        let rejected: Vec<QueuedJob> = {
            let mut state = self.lock();
            state.faulted = true;
            state.processing = false;
            state.in_flight = None;
            let jobs = std::mem::take(&mut state.queue).into_vec();
            state.stats.total_rejected += jobs.len() as u64;
            jobs
        };

        for job in rejected {
            job.task.reject(SchedulerError::Faulted(self.name.clone()));
        }
    }
}

/// What the drain loop does next
enum Step {
    Dispatch(QueuedJob),
    Wait(Duration),
}

/// A token-bucket-gated, priority-ordered job queue for one resource
///
/// Jobs run one at a time in `(priority desc, submission asc)` order. Each
/// dispatch costs one token and is preceded by a random humanization delay.
/// The limiter decides when a job runs, never whether: every submitted job
/// either runs exactly once or is settled with a [`SchedulerError`].
///
/// Cloning is cheap; clones share the same queue and bucket.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter, rejecting budgets that could never dispatch
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Result<Self, SchedulerError> {
        let name = name.into();
        debug!(%name, ?config, "RateLimiter::new: called");
        config.validate().map_err(|e| match e {
            SchedulerError::InvalidConfig(reason) => SchedulerError::InvalidConfig(format!("{}: {}", name, reason)),
            other => other,
        })?;

        let state = LimiterState {
            bucket: TokenBucket::new(config.capacity, config.refill_model(), Instant::now()),
            queue: BinaryHeap::new(),
            in_flight: None,
            processing: false,
            closed: false,
            faulted: false,
            next_id: 1,
            stats: LimiterStats::default(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                jitter: config.jitter(),
                name,
                config,
                state: Mutex::new(state),
                wake: Notify::new(),
                #[cfg(test)]
                fail_drain: std::sync::atomic::AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.shared.config
    }

    /// Queue a job and return a handle to its result
    ///
    /// Nothing is withdrawn from the bucket here; tokens are spent only when
    /// the job is dispatched. Must be called from within a tokio runtime.
    pub fn submit<F, Fut, T>(&self, f: F, priority: impl Into<Priority>) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let priority = priority.into();
        let (tx, rx) = oneshot::channel();

        let mut state = self.shared.lock();
        let id = JobId(state.next_id);
        state.next_id += 1;
        debug!(limiter = %self.shared.name, %id, %priority, "RateLimiter::submit: called");

        let handle = JobHandle::new(id, priority, self.shared.name.clone(), rx);
        let task: Box<dyn Task> = Box::new(TypedTask::new(f, tx));

        if state.faulted || state.closed {
            let err = if state.faulted {
                SchedulerError::Faulted(self.shared.name.clone())
            } else {
                SchedulerError::Shutdown(self.shared.name.clone())
            };
            state.stats.total_rejected += 1;
            drop(state);
            debug!(limiter = %self.shared.name, %id, %err, "RateLimiter::submit: limiter not accepting work");
            task.reject(err);
            return handle;
        }

        state.queue.push(QueuedJob::new(id, priority, Instant::now(), task));
        state.stats.total_scheduled += 1;
        state.stats.peak_queue_depth = state.stats.peak_queue_depth.max(state.queue.len());

        let start_drain = !state.processing;
        if start_drain {
            state.processing = true;
        }
        let queued = state.queue.len();
        drop(state);

        if start_drain {
            debug!(limiter = %self.shared.name, "RateLimiter::submit: starting drain loop");
            self.spawn_drain();
        }

        debug!(limiter = %self.shared.name, %id, queued, "Queued");
        handle
    }

    /// Queue a job and wait for its result
    ///
    /// The job's output comes back untouched: a job returning `Err(e)` yields
    /// `Ok(Err(e))`, the same as awaiting the job directly.
    pub async fn schedule<F, Fut, T>(&self, f: F, priority: impl Into<Priority>) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(f, priority).await
    }

    /// Cancel a queued job
    ///
    /// Returns false if the job is already dispatched, finished, or unknown.
    /// In-flight work is never interrupted.
    pub fn cancel(&self, id: JobId) -> bool {
        debug!(limiter = %self.shared.name, %id, "RateLimiter::cancel: called");
        let removed = {
            let mut state = self.shared.lock();

            if state.in_flight.is_some_and(|f| f.id == id) {
                debug!(limiter = %self.shared.name, %id, "RateLimiter::cancel: is running, cannot cancel");
                return false;
            }

            let (removed, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.queue).into_vec().into_iter().partition(|j| j.id == id);
            state.queue = BinaryHeap::from(kept);
            state.stats.total_cancelled += removed.len() as u64;
            removed
        };

        match removed.into_iter().next() {
            Some(job) => {
                warn!(limiter = %self.shared.name, %id, "Cancelled queued job");
                job.task.reject(SchedulerError::Cancelled(id));
                true
            }
            None => {
                debug!(limiter = %self.shared.name, %id, "RateLimiter::cancel: not found in queue");
                false
            }
        }
    }

    /// Stop accepting work and settle every queued job with `Shutdown`
    ///
    /// A job already in flight runs to completion. Idempotent.
    pub fn shutdown(&self) {
        debug!(limiter = %self.shared.name, "RateLimiter::shutdown: called");
        let rejected: Vec<QueuedJob> = {
            let mut state = self.shared.lock();
            if state.closed {
                debug!(limiter = %self.shared.name, "RateLimiter::shutdown: already closed");
                return;
            }
            state.closed = true;
            let jobs = std::mem::take(&mut state.queue).into_vec();
            state.stats.total_rejected += jobs.len() as u64;
            jobs
        };

        if rejected.is_empty() {
            info!(limiter = %self.shared.name, "Limiter shut down");
        } else {
            warn!(limiter = %self.shared.name, dropped = rejected.len(), "Limiter shut down with queued jobs");
        }

        for job in rejected {
            job.task.reject(SchedulerError::Shutdown(self.shared.name.clone()));
        }

        // Stored permit covers a drain loop that is between checks
        self.shared.wake.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().closed
    }

    /// Get current queue state
    pub fn queue_state(&self) -> QueueState {
        debug!(limiter = %self.shared.name, "RateLimiter::queue_state: called");
        let state = self.shared.lock();
        let now = Instant::now();

        // Refill a copy; only the drain loop moves the real bucket forward
        let mut bucket = state.bucket.clone();
        bucket.refill(now);

        QueueState {
            queued: state.queue.len(),
            in_flight: state.in_flight.map(|f| f.id),
            processing: state.processing,
            closed: state.closed,
            faulted: state.faulted,
            tokens: bucket.tokens(),
            oldest_wait: state
                .queue
                .iter()
                .map(|j| j.submitted_at)
                .min()
                .map(|t| now.saturating_duration_since(t)),
            stats: state.stats.clone(),
        }
    }

    /// Running job followed by queued jobs, in dispatch order
    pub fn queue_details(&self) -> Vec<QueueEntry> {
        debug!(limiter = %self.shared.name, "RateLimiter::queue_details: called");
        let state = self.shared.lock();
        let now = Instant::now();

        let mut queued: Vec<&QueuedJob> = state.queue.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));

        state
            .in_flight
            .iter()
            .map(|f| QueueEntry {
                id: f.id,
                priority: f.priority,
                status: QueueEntryStatus::Running,
                wait_time: now.saturating_duration_since(f.dispatched_at),
            })
            .chain(queued.into_iter().map(|j| QueueEntry {
                id: j.id,
                priority: j.priority,
                status: QueueEntryStatus::Queued,
                wait_time: now.saturating_duration_since(j.submitted_at),
            }))
            .collect()
    }

    pub fn stats(&self) -> LimiterStats {
        self.shared.lock().stats.clone()
    }

    fn spawn_drain(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(drain(Arc::clone(&shared))).catch_unwind().await {
                error!(
                    limiter = %shared.name,
                    panic = %panic_message(payload.as_ref()),
                    "Drain loop panicked; limiter faulted"
                );
                shared.fault();
            }
        });
    }
}

/// The single queue-draining loop of a limiter
async fn drain(shared: Arc<Shared>) {
    debug!(limiter = %shared.name, "drain: started");
    loop {
        #[cfg(test)]
        if shared.fail_drain.swap(false, std::sync::atomic::Ordering::SeqCst) {
            panic!("drain loop failure");
        }

        let step = {
            let mut state = shared.lock();

            if state.closed {
                state.processing = false;
                debug!(limiter = %shared.name, "drain: limiter closed, exiting");
                return;
            }

            match state.queue.pop() {
                None => {
                    // Cleared under the same lock `submit` checks, so no job is stranded
                    state.processing = false;
                    debug!(limiter = %shared.name, "drain: queue empty, exiting");
                    return;
                }
                Some(job) => {
                    let now = Instant::now();
                    if state.bucket.try_take(now) {
                        let waited = now.saturating_duration_since(job.submitted_at);
                        state.stats.total_dispatched += 1;
                        state.stats.total_wait_time_ms += waited.as_millis() as u64;
                        state.in_flight = Some(InFlight {
                            id: job.id,
                            priority: job.priority,
                            dispatched_at: now,
                        });
                        Step::Dispatch(job)
                    } else {
                        let wait = state.bucket.time_until_token(now);
                        state.queue.push(job);
                        Step::Wait(wait)
                    }
                }
            }
        };

        match step {
            Step::Wait(wait) => {
                debug!(limiter = %shared.name, ?wait, "drain: out of tokens, waiting");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shared.wake.notified() => {
                        debug!(limiter = %shared.name, "drain: woken early");
                    }
                }
            }
            Step::Dispatch(job) => {
                let delay = shared.jitter.sample();
                debug!(limiter = %shared.name, id = %job.id, priority = %job.priority, ?delay, "drain: dispatching");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let id = job.id;
                let outcome = job.task.run(id).await;

                let mut state = shared.lock();
                state.in_flight = None;
                match outcome {
                    Outcome::Completed => {
                        state.stats.total_completed += 1;
                        debug!(limiter = %shared.name, %id, "Completed");
                    }
                    Outcome::Panicked => {
                        state.stats.total_panicked += 1;
                        warn!(limiter = %shared.name, %id, "Job panicked");
                    }
                }
            }
        }
    }
}
