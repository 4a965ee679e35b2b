use std::any::Any;

use parking_lot::{Condvar, Mutex};

use super::TaskState;
use crate::error::{Error, Result};

pub(crate) type Payload = Box<dyn Any + Send>;
pub(crate) type AfterSuspend = Box<dyn FnOnce() + Send>;

/// What a resumer hands to a suspended task.
pub(crate) enum Resumption {
    Value(Payload),
    Error(anyhow::Error),
}

/// What a task hands back to whoever resumed it.
enum Yielded {
    Suspended(Option<AfterSuspend>),
    Finished(Result<()>),
}

/// Passes control back and forth between a task's thread and the thread resuming it.
///
/// Exactly one side runs at a time: the resumer blocks until the task yields, and the task
/// blocks until it is resumed again.
pub(crate) struct Handoff {
    slot: Mutex<Slot>,
    cvar: Condvar,
}

struct Slot {
    state: TaskState,
    inbound: Option<Resumption>,
    outbound: Option<Yielded>,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        Handoff {
            slot: Mutex::new(Slot {
                state: TaskState::NotStarted,
                inbound: None,
                outbound: None,
            }),
            cvar: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.slot.lock().state
    }
}

impl Handoff {
    /// Resumer side. Delivers `resumption`, or calls `start` if the task never ran, then
    /// waits for the task to suspend or finish.
    ///
    /// The task only counts as `Suspended` once this side has taken its yield, so nobody
    /// else can resume it before the continuation passed to `suspend` has run.
    pub(crate) fn resume(
        &self,
        resumption: Resumption,
        start: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        // Acquire the lock first
        let mut slot = self.slot.lock();

        match (slot.state, resumption) {
            (TaskState::NotStarted, Resumption::Value(_)) => {
                slot.state = TaskState::Running;
                if let Err(error) = start() {
                    slot.state = TaskState::NotStarted;
                    return Err(error);
                }
            }
            (TaskState::Suspended, resumption) => {
                slot.state = TaskState::Running;
                slot.inbound = Some(resumption);
                self.cvar.notify_all();
            }
            (found, _) => return Err(Error::InvalidState { found }),
        }

        // wait until the task hands control back
        let yielded = loop {
            if let Some(yielded) = slot.outbound.take() {
                break yielded;
            }
            self.cvar.wait(&mut slot);
        };

        match yielded {
            Yielded::Suspended(after) => {
                slot.state = TaskState::Suspended;
                drop(slot);
                if let Some(after) = after {
                    after();
                }
                Ok(())
            }
            Yielded::Finished(result) => result,
        }
    }

    /// Task side. Yields to the resumer and blocks until the next resumption arrives.
    pub(crate) fn suspend(&self, after: Option<AfterSuspend>) -> Resumption {
        let mut slot = self.slot.lock();
        slot.outbound = Some(Yielded::Suspended(after));
        self.cvar.notify_all();

        loop {
            if let Some(resumption) = slot.inbound.take() {
                return resumption;
            }
            self.cvar.wait(&mut slot);
        }
    }

    /// Task side. Marks the task finished and wakes the resumer with the body's outcome.
    pub(crate) fn finish(&self, outcome: Result<()>) {
        let mut slot = self.slot.lock();
        slot.state = TaskState::Finished;
        slot.outbound = Some(Yielded::Finished(outcome));
        self.cvar.notify_all();
    }
}
