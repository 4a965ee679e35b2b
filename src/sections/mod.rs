//! Critical sections for tasks.
//!
//! A section runs operations on behalf of the tasks calling it. When the section is free
//! the operation runs inline, on the caller's thread, and the caller never suspends. When
//! it is taken the caller suspends and its operation is queued; once granted, the operation
//! runs as a new task on the executor the caller passed in, and the caller is resumed with
//! its result.
//!
//! Every section keeps its bookkeeping behind a ledger lock. A caller that has to wait
//! keeps the ledger locked across its suspension, and the continuation releases it once
//! the caller is queued, so a release can never slip in between the check and the enqueue.

mod exclusive;
mod read_priority;
mod rw;
mod write_priority;


use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    bridge,
    error::{panic_message, Error},
    executors::SharedExecutor,
    task::{Payload, Resumption, Task},
};

pub use exclusive::ExclusiveSection;
pub use read_priority::ReadPrioritySection;
pub use write_priority::WritePrioritySection;

type Operation = Box<dyn FnOnce() -> anyhow::Result<Payload> + Send>;
type Release = Box<dyn FnOnce() + Send>;

/// A suspended caller and the operation it is waiting to have run.
pub(crate) struct Waiting {
    executor: SharedExecutor,
    task: Task,
    operation: Operation,
}

impl Waiting {
    pub(crate) fn new<R, F>(executor: &SharedExecutor, task: Task, operation: F) -> Self
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        Self {
            executor: executor.clone(),
            task,
            operation: Box::new(move || operation().map(|value| Box::new(value) as Payload)),
        }
    }

    /// Runs the operation as a new task on the waiter's executor, then calls `release` and
    /// finally resumes the waiter with the operation's outcome.
    ///
    /// If the executor refuses the job, the section is released anyway and the waiter is
    /// resumed with [`Error::ExecutorShutdown`].
    pub(crate) fn dispatch<F>(self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Waiting {
            executor,
            task,
            operation,
        } = self;
        let parcel = Arc::new(Mutex::new(Some(Parcel {
            task,
            operation,
            release: Box::new(release),
        })));

        let pending = parcel.clone();
        let submitted = bridge::submit(&executor, move || {
            let parcel = pending.lock().take();
            match parcel {
                Some(parcel) => parcel.serve(),
                None => Ok(()),
            }
        });

        if let Err(error) = submitted {
            if let Some(parcel) = parcel.lock().take() {
                log::warn!(
                    "could not dispatch operation for task {}: {error}",
                    parcel.task.id()
                );
                parcel.reject(error);
            }
        }
    }
}

/// Everything a granted waiter needs, taken by exactly one of the job or the rejection.
struct Parcel {
    task: Task,
    operation: Operation,
    release: Release,
}

impl Parcel {
    fn serve(self) -> anyhow::Result<()> {
        let resumption = match catch_unwind(AssertUnwindSafe(self.operation)) {
            Ok(Ok(payload)) => Resumption::Value(payload),
            Ok(Err(error)) => Resumption::Error(error),
            Err(panic) => Resumption::Error(Error::Panicked(panic_message(panic)).into()),
        };
        (self.release)();
        self.task.resume_with(resumption)?;
        Ok(())
    }

    fn reject(self, error: Error) {
        (self.release)();
        if let Err(failure) = self.task.resume_with(Resumption::Error(error.into())) {
            log::error!(
                "task {} failed after its operation was rejected: {failure:#}",
                self.task.id()
            );
        }
    }
}

/// Runs `release` when dropped, so an inline operation gives the section back even if it
/// fails or panics.
pub(crate) struct Finally<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Finally<F> {
    pub(crate) fn new(release: F) -> Self {
        Self(Some(release))
    }
}

impl<F: FnOnce()> Drop for Finally<F> {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// The task that will have to wait, or [`Error::NotInTask`].
pub(crate) fn waiter() -> anyhow::Result<Task> {
    Ok(Task::current().ok_or(Error::NotInTask)?)
}
