//! Type-erased jobs and the caller-side handle

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::domain::Priority;

use super::error::SchedulerError;
use super::queue::JobId;

/// How a dispatched job ended, from the scheduler's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The job ran to completion; its output (success or failure) went to the caller
    Completed,

    /// The job panicked while being built or polled
    Panicked,
}

/// A queued unit of work with its output type erased
pub(crate) trait Task: Send {
    /// Run the job and deliver its result to the waiting handle
    fn run(self: Box<Self>, id: JobId) -> BoxFuture<'static, Outcome>;

    /// Settle the handle without running the job
    fn reject(self: Box<Self>, err: SchedulerError);
}

pub(crate) struct TypedTask<F, T> {
    f: F,
    tx: oneshot::Sender<Result<T, SchedulerError>>,
}

impl<F, T> TypedTask<F, T> {
    pub(crate) fn new(f: F, tx: oneshot::Sender<Result<T, SchedulerError>>) -> Self {
        Self { f, tx }
    }
}

impl<F, Fut, T> Task for TypedTask<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>, id: JobId) -> BoxFuture<'static, Outcome> {
        let TypedTask { f, tx } = *self;
        Box::pin(async move {
            // A panic while building the future counts the same as one while polling it
            let result = match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(payload) => Err(payload),
            };

            let (outcome, result) = match result {
                Ok(value) => (Outcome::Completed, Ok(value)),
                Err(payload) => (
                    Outcome::Panicked,
                    Err(SchedulerError::Panicked {
                        id,
                        message: panic_message(payload.as_ref()),
                    }),
                ),
            };

            // The caller may have dropped its handle; the job still counts as run
            let _ = tx.send(result);
            outcome
        })
    }

    fn reject(self: Box<Self>, err: SchedulerError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a submitted job
///
/// Resolves to the job's own output once it has run, or to a
/// [`SchedulerError`] if it was cancelled, rejected by a shut down limiter, or
/// panicked. Dropping the handle does not cancel the job.
#[must_use = "a JobHandle does nothing unless awaited; the job runs either way"]
pub struct JobHandle<T> {
    id: JobId,
    priority: Priority,
    limiter: String,
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(
        id: JobId,
        priority: Priority,
        limiter: String,
        rx: oneshot::Receiver<Result<T, SchedulerError>>,
    ) -> Self {
        Self {
            id,
            priority,
            limiter,
            rx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Name of the limiter the job was submitted to
    pub fn limiter(&self) -> &str {
        &self.limiter
    }
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without settling: the drain task died with the job
            Poll::Ready(Err(_)) => Poll::Ready(Err(SchedulerError::Faulted(self.limiter.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_pair<T>() -> (oneshot::Sender<Result<T, SchedulerError>>, JobHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (tx, JobHandle::new(JobId(1), Priority::NORMAL, "test".to_string(), rx))
    }

    #[tokio::test]
    async fn test_run_delivers_output() {
        let (tx, handle) = handle_pair();
        let task: Box<dyn Task> = Box::new(TypedTask::new(|| async { 42 }, tx));

        assert_eq!(task.run(JobId(1)).await, Outcome::Completed);
        assert_eq!(handle.await, Ok(42));
    }

    #[tokio::test]
    async fn test_job_error_passes_through_untouched() {
        let (tx, handle) = handle_pair::<Result<(), String>>();
        let task: Box<dyn Task> = Box::new(TypedTask::new(|| async { Err("HTTP 429".to_string()) }, tx));

        assert_eq!(task.run(JobId(1)).await, Outcome::Completed);
        assert_eq!(handle.await, Ok(Err("HTTP 429".to_string())));
    }

    #[tokio::test]
    async fn test_panic_while_building_future() {
        let (tx, handle) = handle_pair::<()>();
        let task: Box<dyn Task> = Box::new(TypedTask::new(
            || -> futures::future::Ready<()> { panic!("boom") },
            tx,
        ));

        assert_eq!(task.run(JobId(1)).await, Outcome::Panicked);
        assert_eq!(
            handle.await,
            Err(SchedulerError::Panicked {
                id: JobId(1),
                message: "boom".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_panic_while_polling() {
        let (tx, handle) = handle_pair::<()>();
        let task: Box<dyn Task> = Box::new(TypedTask::new(
            || async {
                tokio::task::yield_now().await;
                if true {
                    panic!("late {}", "boom");
                }
            },
            tx,
        ));

        assert_eq!(task.run(JobId(1)).await, Outcome::Panicked);
        assert!(matches!(handle.await, Err(SchedulerError::Panicked { message, .. }) if message == "late boom"));
    }

    #[tokio::test]
    async fn test_reject() {
        let (tx, handle) = handle_pair::<u8>();
        let task: Box<dyn Task> = Box::new(TypedTask::new(|| async { 1u8 }, tx));

        task.reject(SchedulerError::Cancelled(JobId(1)));
        assert_eq!(handle.await, Err(SchedulerError::Cancelled(JobId(1))));
    }

    #[tokio::test]
    async fn test_dropped_sender_reports_fault() {
        let (tx, handle) = handle_pair::<u8>();
        drop(tx);
        assert_eq!(handle.await, Err(SchedulerError::Faulted("test".to_string())));
    }
}
