use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use super::{Job, RepeatingJob, ScheduledHandle};

pub(crate) enum TimerJob {
    Once(Job),
    Repeating {
        job: RepeatingJob,
        interval: Duration,
    },
}

pub(crate) struct Timer<T> {
    pub(crate) at: T,
    seq: u64,
    handle: ScheduledHandle,
    job: TimerJob,
}

/// Outcome of firing a due timer.
pub(crate) enum Fired<T> {
    Run(Job),
    /// Nothing to run. Handed back so the caller can drop it outside its lock.
    Cancelled(Timer<T>),
}

/// A point on an executor's clock.
pub(crate) trait Deadline: Ord + Copy {
    /// The point `by` later, or `None` past the end of the clock.
    fn after(self, by: Duration) -> Option<Self>;
}

impl Deadline for Instant {
    fn after(self, by: Duration) -> Option<Self> {
        self.checked_add(by)
    }
}

impl Deadline for Duration {
    fn after(self, by: Duration) -> Option<Self> {
        self.checked_add(by)
    }
}

/// Timers ordered by deadline, ties broken by insertion order.
///
/// Generic over the clock so the thread pool can use `Instant` and the manual executor a
/// virtual `Duration` since its creation.
pub(crate) struct TimerQueue<T> {
    heap: BinaryHeap<Timer<T>>,
    seq: u64,
}

impl<T> TimerQueue<T>
where
    T: Deadline,
{
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Arms `job` to fire `delay` after `from`.
    ///
    /// A deadline past the end of the clock can never be reached: nothing is armed and the
    /// job is handed back so the caller can drop it outside its lock.
    pub(crate) fn push(
        &mut self,
        from: T,
        delay: Duration,
        handle: ScheduledHandle,
        job: TimerJob,
    ) -> Option<TimerJob> {
        let Some(at) = from.after(delay) else {
            log::trace!("deadline out of range, job will never fire");
            return Some(job);
        };
        self.seq += 1;
        self.heap.push(Timer {
            at,
            seq: self.seq,
            handle,
            job,
        });
        None
    }

    pub(crate) fn next_at(&self) -> Option<T> {
        self.heap.peek().map(|timer| timer.at)
    }

    /// Removes the earliest timer if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: T) -> Option<Timer<T>> {
        if self.next_at()? <= now {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Turns a due timer into the job to run now. Fixed rate timers are re-armed one
    /// interval after their previous deadline.
    pub(crate) fn fire(&mut self, timer: Timer<T>) -> Fired<T> {
        if timer.handle.is_cancelled() {
            return Fired::Cancelled(timer);
        }
        match timer.job {
            TimerJob::Once(job) => {
                if timer.handle.begin() {
                    Fired::Run(job)
                } else {
                    Fired::Cancelled(Timer {
                        job: TimerJob::Once(job),
                        ..timer
                    })
                }
            }
            TimerJob::Repeating { job, interval } => {
                let tick = job.clone();
                // `tick` keeps the job alive, so an unarmed repeat only drops a handle here
                _ = self.push(
                    timer.at,
                    interval,
                    timer.handle,
                    TimerJob::Repeating { job, interval },
                );
                Fired::Run(Box::new(move || tick()))
            }
        }
    }

    /// Timers that can still fire.
    pub(crate) fn live(&self) -> usize {
        self.heap
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .count()
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::replace(self, Self::new())
    }
}

impl<T: Ord> Ord for Timer<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed so the `BinaryHeap` pops the earliest deadline first
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T: Ord> PartialOrd for Timer<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> PartialEq for Timer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for Timer<T> {}
