//! Periodic tasks.
//!
//! A [`TimedTask`] is an async job registered alongside the handlers and run
//! by the runtime on a fixed interval.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use amber_core::BoxError;

use crate::reply::BoxFuture;

/// A type-erased task body.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Types that can be returned from a task body.
pub trait TaskOutcome: Send + 'static {
    /// Converts the value into the normalized task outcome.
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl TaskOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> TaskOutcome for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// A named job run every `interval`.
#[derive(Clone)]
pub struct TimedTask {
    name: String,
    interval: Duration,
    task: TaskFn,
}

impl TimedTask {
    /// Creates a task from an async closure.
    pub fn new<F, Fut, R>(name: impl Into<String>, interval: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: TaskOutcome,
    {
        Self {
            name: name.into(),
            interval,
            task: Arc::new(move || {
                let fut = f();
                Box::pin(async move { fut.await.into_outcome() })
            }),
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the run interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the task body once.
    pub async fn run_once(&self) -> Result<(), BoxError> {
        (self.task)().await
    }
}

impl fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = TimedTask::new("tick", Duration::from_secs(60), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        task.run_once().await.unwrap();
        task.run_once().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(task.name(), "tick");
        assert_eq!(task.interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_failing_task() {
        let task = TimedTask::new("broken", Duration::from_secs(1), || async {
            Err::<(), _>("disk full")
        });
        assert_eq!(task.run_once().await.unwrap_err().to_string(), "disk full");
    }
}
