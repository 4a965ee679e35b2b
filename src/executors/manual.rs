use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use super::{
    timer::{Fired, TimerJob, TimerQueue},
    Executor, Job, RepeatingJob, ScheduledHandle,
};
use crate::error::{Error, Result};

/// A single-threaded executor driven by hand.
///
/// Submitted jobs run immediately on the submitting thread. Delayed and fixed rate jobs
/// wait on a virtual clock that only moves when [`ManualExecutor::advance`] is called.
/// Shutting down does not panic; it is recorded so tests can assert on it.
pub struct ManualExecutor {
    clock: Mutex<Clock>,
    shutdown: AtomicBool,
}

struct Clock {
    now: Duration,
    timers: TimerQueue<Duration>,
}

impl ManualExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clock: Mutex::new(Clock {
                now: Duration::ZERO,
                timers: TimerQueue::new(),
            }),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Scheduled jobs that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.clock.lock().timers.live()
    }

    /// Moves the clock forward by `by`, running every job that falls due in deadline order.
    /// A fixed rate job runs once for each of its ticks inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now().saturating_add(by);
        loop {
            let fired = {
                let mut clock = self.clock.lock();
                let Some(timer) = clock.timers.pop_due(target) else {
                    break;
                };
                clock.now = clock.now.max(timer.at);
                clock.timers.fire(timer)
            };

            // jobs may schedule more work, so they run with the clock unlocked
            if let Fired::Run(job) = fired {
                if !self.is_shutdown() {
                    job();
                }
            }
        }
        self.clock.lock().now = target;
    }

    fn check_open(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::ExecutorShutdown);
        }
        Ok(())
    }

    fn arm(&self, delay: Duration, job: TimerJob) -> ScheduledHandle {
        let handle = ScheduledHandle::new();
        let unarmed = {
            let mut clock = self.clock.lock();
            let now = clock.now;
            clock.timers.push(now, delay, handle.clone(), job)
        };
        drop(unarmed);
        handle
    }
}

impl Executor for ManualExecutor {
    fn submit(&self, job: Job) -> Result<()> {
        self.check_open()?;
        job();
        Ok(())
    }

    fn schedule(&self, job: Job, delay: Duration) -> Result<ScheduledHandle> {
        self.check_open()?;
        Ok(self.arm(delay, TimerJob::Once(job)))
    }

    fn schedule_at_fixed_rate(
        &self,
        job: RepeatingJob,
        delay: Duration,
        interval: Duration,
    ) -> Result<ScheduledHandle> {
        self.check_open()?;
        if interval.is_zero() {
            return Err(Error::ZeroInterval);
        }
        Ok(self.arm(delay, TimerJob::Repeating { job, interval }))
    }

    fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            log::debug!("manual executor shut down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
