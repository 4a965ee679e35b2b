//! Where resumed work runs.
//!
//! Sections and the bridge only ever talk to an [`Executor`]: something that runs a job now,
//! after a delay, or at a fixed rate. [`ThreadPoolExecutor`] runs jobs on a pool of worker
//! threads. [`ManualExecutor`] runs them inline and keeps a virtual clock, for tests.

mod manual;
mod pool;
mod timer;


use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::error::Result;

pub use manual::ManualExecutor;
pub use pool::{PoolConfig, ThreadPoolExecutor};

/// A job run once.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A job run on every tick of a fixed rate schedule.
pub type RepeatingJob = Arc<dyn Fn() + Send + Sync + 'static>;

/// The executor handle stored by sections and passed around by the bridge.
pub type SharedExecutor = Arc<dyn Executor>;

/// Runs jobs now or later.
///
/// Once [`Executor::shutdown`] has been called, every scheduling method fails with
/// [`Error::ExecutorShutdown`](crate::Error::ExecutorShutdown).
pub trait Executor: Send + Sync {
    /// Runs `job` as soon as possible.
    fn submit(&self, job: Job) -> Result<()>;

    /// Runs `job` once `delay` has elapsed.
    fn schedule(&self, job: Job, delay: Duration) -> Result<ScheduledHandle>;

    /// Runs `job` after `delay`, then every `interval` after that.
    fn schedule_at_fixed_rate(
        &self,
        job: RepeatingJob,
        delay: Duration,
        interval: Duration,
    ) -> Result<ScheduledHandle>;

    /// Stops accepting new work. Work that is already running is left alone.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Cancels a job handed to [`Executor::schedule`] or [`Executor::schedule_at_fixed_rate`].
#[derive(Debug, Clone)]
pub struct ScheduledHandle {
    state: Arc<AtomicU8>,
}

impl ScheduledHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Prevents the job from running again.
    ///
    /// Returns `false` if the handle was already cancelled or a one-shot job has already
    /// started. A job that started running is never interrupted.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Claims a one-shot job for running. Fails if it was cancelled first.
    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
