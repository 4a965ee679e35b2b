//! Glue between plain code, executors and tasks.
//!
//! [`submit`], [`delay`] and [`repeat_at_fixed_rate`] start new tasks on an executor. An
//! error or panic escaping one of those tasks has nobody waiting for it, so it goes to
//! [`fatal`]: it is logged and the executor is shut down.
//!
//! From inside a task, [`offload_blocking`] and [`sleep`] park the task while an executor
//! does the work, and [`await_external`] parks it until a [`Completion`] resolves.
//! [`run_blockingly`] goes the other way and lets plain code wait for a task.

mod blocking;
mod completion;

#[cfg(test)]
mod tests;

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use crate::{
    error::{panic_message, Error, Result},
    executors::{Executor, ScheduledHandle, SharedExecutor},
    task::{Resumption, Task},
};

pub use blocking::{offload_blocking, offload_blocking_unit, run_blockingly, sleep};
pub use completion::{await_external, completion, Completer, Completion};

/// Logs `error` and shuts `executor` down.
///
/// This is where failures end up when the code that raised them has no caller to report
/// to. After it runs the executor refuses new work.
pub fn fatal(executor: &dyn Executor, error: anyhow::Error) {
    log::error!("uncaught error in scheduled task, shutting down executor: {error:#}");
    executor.shutdown();
}

/// Runs `job` as a new task on `executor`.
///
/// # Example
///
/// ```rust
/// use cosections::{bridge, ManualExecutor, SharedExecutor};
/// use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
///
/// let executor: SharedExecutor = ManualExecutor::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
/// bridge::submit(&executor, move || {
///     flag.store(true, Ordering::SeqCst);
///     Ok(())
/// })
/// .unwrap();
/// assert!(ran.load(Ordering::SeqCst));
/// ```
pub fn submit<F>(executor: &SharedExecutor, job: F) -> Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let owner = Arc::downgrade(executor);
    let task = guarded_task(owner.clone(), job);
    executor.submit(Box::new(move || start(&task, &owner)))
}

/// Runs `job` as a new task on `executor` once `duration` has elapsed.
pub fn delay<F>(executor: &SharedExecutor, duration: Duration, job: F) -> Result<ScheduledHandle>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let owner = Arc::downgrade(executor);
    let task = guarded_task(owner.clone(), job);
    executor.schedule(Box::new(move || start(&task, &owner)), duration)
}

/// Runs `job` as a new task every `interval`, the first time one interval from now.
///
/// Runs never overlap. A tick that fires while the previous run is still unfinished,
/// suspended included, is skipped rather than queued.
///
/// # Errors
///
/// * [`Error::ZeroInterval`] if `interval` is zero
/// * [`Error::ExecutorShutdown`] if `executor` no longer accepts work
pub fn repeat_at_fixed_rate<F>(
    executor: &SharedExecutor,
    interval: Duration,
    job: F,
) -> Result<ScheduledHandle>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    if interval.is_zero() {
        return Err(Error::ZeroInterval);
    }
    let job = Arc::new(job);
    let running = Arc::new(AtomicBool::new(false));
    let owner = Arc::downgrade(executor);

    executor.schedule_at_fixed_rate(
        Arc::new(move || {
            if running.swap(true, Ordering::AcqRel) {
                log::trace!("previous run still in progress, skipping tick");
                return;
            }
            let job = job.clone();
            let running = ClearOnDrop(running.clone());
            let task = guarded_task(owner.clone(), move || {
                let _running = running;
                job()
            });
            start(&task, &owner);
        }),
        interval,
        interval,
    )
}

/// Wraps `job` in a task whose failures go to [`fatal`] instead of its resumer.
fn guarded_task<F>(owner: Weak<dyn Executor>, job: F) -> Task
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    Task::new(move || {
        let failure = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(error)) => error,
            Err(panic) => Error::Panicked(panic_message(panic)).into(),
        };
        fatal_to(&owner, failure);
        Ok(())
    })
}

fn start(task: &Task, owner: &Weak<dyn Executor>) {
    if let Err(error) = task.start() {
        fatal_to(owner, error.into());
    }
}

/// Resumes `task` from a job running on `owner`. Whatever the task's body returns has
/// nowhere else to go.
pub(crate) fn resume_from_job(task: &Task, resumption: Resumption, owner: &Weak<dyn Executor>) {
    if let Err(error) = task.resume_with(resumption) {
        fatal_to(owner, error.into());
    }
}

fn fatal_to(owner: &Weak<dyn Executor>, error: anyhow::Error) {
    match owner.upgrade() {
        Some(executor) => fatal(executor.as_ref(), error),
        None => log::error!("uncaught error after its executor was dropped: {error:#}"),
    }
}

struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
