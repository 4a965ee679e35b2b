use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use futures_lite::future::block_on;

use super::{completion::completion, resume_from_job};
use crate::{
    error::{panic_message, Error},
    executors::SharedExecutor,
    task::{suspend_then, Resumption, Task},
};

/// Suspends the current task while `work` runs on `executor`, then returns what `work`
/// returned.
///
/// The task is resumed on whichever thread ran `work`. If `executor` refuses the job the
/// task is resumed straight away with [`Error::ExecutorShutdown`].
///
/// # Errors
///
/// * [`Error::NotInTask`] when called outside a task
/// * whatever `work` fails with, or [`Error::Panicked`] if it panicked
pub fn offload_blocking<T, F>(executor: &SharedExecutor, work: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let task = Task::current().ok_or(Error::NotInTask)?;
    let executor = executor.clone();

    suspend_then(move || {
        let owner = Arc::downgrade(&executor);
        let resumer = task.clone();
        let job_owner = owner.clone();
        let submitted = executor.submit(Box::new(move || {
            let resumption = match catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(value)) => Resumption::Value(Box::new(value)),
                Ok(Err(error)) => Resumption::Error(error),
                Err(panic) => Resumption::Error(Error::Panicked(panic_message(panic)).into()),
            };
            resume_from_job(&resumer, resumption, &job_owner);
        }));

        if let Err(error) = submitted {
            log::warn!("task {} could not offload work: {error}", task.id());
            resume_from_job(&task, Resumption::Error(error.into()), &owner);
        }
    })
}

/// [`offload_blocking`] for work that only reports success or failure.
pub fn offload_blocking_unit<F>(executor: &SharedExecutor, work: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    offload_blocking(executor, work)
}

/// Suspends the current task and resumes it on `executor` once `duration` has elapsed.
pub fn sleep(executor: &SharedExecutor, duration: Duration) -> anyhow::Result<()> {
    let task = Task::current().ok_or(Error::NotInTask)?;
    let executor = executor.clone();

    suspend_then(move || {
        let owner = Arc::downgrade(&executor);
        let sleeper = task.clone();
        let job_owner = owner.clone();
        let wake = Box::new(move || {
            resume_from_job(&sleeper, Resumption::Value(Box::new(())), &job_owner);
        });
        let scheduled = executor.schedule(wake, duration);

        if let Err(error) = scheduled {
            resume_from_job(&task, Resumption::Error(error.into()), &owner);
        }
    })
}

/// Runs `body` as a new task and blocks the calling thread until it finishes.
///
/// The calling thread only starts the task. Anything the task suspends on must be resumed
/// from some other thread, typically by an executor's workers, or this never returns.
///
/// # Example
///
/// ```rust
/// use cosections::{bridge, SharedExecutor, ThreadPoolExecutor};
///
/// let executor: SharedExecutor = ThreadPoolExecutor::new().unwrap();
/// let worker = executor.clone();
/// let answer = bridge::run_blockingly(move || {
///     bridge::offload_blocking(&worker, || Ok(6 * 7))
/// })
/// .unwrap();
/// assert_eq!(answer, 42);
/// ```
pub fn run_blockingly<T, F>(body: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let (completer, completion) = completion();
    let task = Task::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(body))
            .unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic)).into()));
        completer.complete(outcome);
        Ok(())
    });
    task.start()?;
    block_on(completion)
}
