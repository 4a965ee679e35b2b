use std::{collections::VecDeque, fmt, sync::Arc};

use super::{waiter, Finally, Waiting};
use crate::{executors::SharedExecutor, shared::Ledger, task::suspend_then};

/// Who gets the section first when both readers and writers are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bias {
    /// New readers join a running batch even if a writer waits. Finishing writers let
    /// every queued reader in.
    Read,
    /// A waiting or active writer holds back new readers. The last reader out hands over to
    /// the oldest writer; finishing writers still let queued readers in as one batch.
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holders {
    Unlocked,
    Reading(usize),
    Writing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Reader,
    Writer,
}

enum Grant {
    Read(Waiting),
    Write(Waiting),
}

struct State {
    holders: Holders,
    reads: VecDeque<Waiting>,
    writes: VecDeque<Waiting>,
}

/// Shared machinery of the reader-writer sections; the [`Bias`] decides who goes next.
pub(crate) struct RwSection {
    bias: Bias,
    ledger: Arc<Ledger<State>>,
}

impl RwSection {
    pub(crate) fn new(bias: Bias) -> Self {
        Self {
            bias,
            ledger: Arc::new(Ledger::new(State {
                holders: Holders::Unlocked,
                reads: VecDeque::new(),
                writes: VecDeque::new(),
            })),
        }
    }

    pub(crate) fn read<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        let mut state = self.ledger.lock();
        let holders = state.holders;
        let admitted = match holders {
            Holders::Writing => None,
            _ if self.bias == Bias::Write && !state.writes.is_empty() => None,
            Holders::Unlocked => Some(1),
            Holders::Reading(readers) => Some(readers + 1),
        };

        if let Some(readers) = admitted {
            state.holders = Holders::Reading(readers);
            drop(state);
            let _release = Finally::new(|| self.release(Role::Reader));
            return operation();
        }

        let task = waiter()?;
        log::debug!("task {} waiting to read", task.id());
        let waiting = Waiting::new(executor, task, operation);
        suspend_then(move || {
            state.reads.push_back(waiting);
            drop(state);
        })
    }

    pub(crate) fn write<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        let mut state = self.ledger.lock();
        if state.holders == Holders::Unlocked {
            state.holders = Holders::Writing;
            drop(state);
            let _release = Finally::new(|| self.release(Role::Writer));
            return operation();
        }

        let task = waiter()?;
        log::debug!("task {} waiting to write", task.id());
        let waiting = Waiting::new(executor, task, operation);
        suspend_then(move || {
            state.writes.push_back(waiting);
            drop(state);
        })
    }

    pub(crate) fn try_unique_write<F>(
        &self,
        executor: &SharedExecutor,
        operation: F,
    ) -> anyhow::Result<bool>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut state = self.ledger.lock();
        let holders = state.holders;
        match holders {
            Holders::Unlocked => {
                state.holders = Holders::Writing;
                drop(state);
                let _release = Finally::new(|| self.release(Role::Writer));
                operation()?;
                Ok(true)
            }
            Holders::Writing => Ok(false),
            Holders::Reading(_) if !state.writes.is_empty() => Ok(false),
            Holders::Reading(_) => {
                let task = waiter()?;
                log::debug!("task {} waiting as the unique writer", task.id());
                let waiting = Waiting::new(executor, task, operation);
                suspend_then::<(), _>(move || {
                    state.writes.push_back(waiting);
                    drop(state);
                })?;
                Ok(true)
            }
        }
    }

    pub(crate) fn readers(&self) -> usize {
        match self.ledger.lock().holders {
            Holders::Reading(readers) => readers,
            _ => 0,
        }
    }

    pub(crate) fn is_writing(&self) -> bool {
        self.ledger.lock().holders == Holders::Writing
    }

    fn release(&self, finished: Role) {
        release(&self.ledger, self.bias, finished);
    }
}

impl fmt::Debug for RwSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.ledger.lock();
        f.debug_struct("RwSection")
            .field("bias", &self.bias)
            .field("holders", &state.holders)
            .field("reads", &state.reads.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

fn release(ledger: &Arc<Ledger<State>>, bias: Bias, finished: Role) {
    let grants = ledger.lock().release(bias, finished);

    for grant in grants {
        let ledger = ledger.clone();
        match grant {
            Grant::Read(waiting) => waiting.dispatch(move || release(&ledger, bias, Role::Reader)),
            Grant::Write(waiting) => waiting.dispatch(move || release(&ledger, bias, Role::Writer)),
        }
    }
}

impl State {
    /// Updates the holders after one of them finished and returns the waiters to run next.
    fn release(&mut self, bias: Bias, finished: Role) -> Vec<Grant> {
        let remaining = match (self.holders, finished) {
            (Holders::Reading(readers), Role::Reader) => readers.saturating_sub(1),
            _ => 0,
        };

        match (bias, finished) {
            (Bias::Read, _) | (Bias::Write, Role::Writer) => self.admit_readers(remaining),
            (Bias::Write, Role::Reader) if remaining > 0 => {
                self.holders = Holders::Reading(remaining);
                Vec::new()
            }
            (Bias::Write, Role::Reader) => match self.admit_writer() {
                Some(grant) => vec![grant],
                None => self.admit_readers(0),
            },
        }
    }

    /// Lets every queued reader join the `remaining` ones as one batch. Only when nobody is
    /// left reading does a writer get a turn.
    fn admit_readers(&mut self, remaining: usize) -> Vec<Grant> {
        let readers = remaining + self.reads.len();
        if readers > 0 {
            self.holders = Holders::Reading(readers);
            if !self.reads.is_empty() {
                log::debug!("releasing {} queued readers", self.reads.len());
            }
            return self.reads.drain(..).map(Grant::Read).collect();
        }
        self.admit_writer().into_iter().collect()
    }

    /// Hands the section to the oldest queued writer, or unlocks it if there is none.
    fn admit_writer(&mut self) -> Option<Grant> {
        match self.writes.pop_front() {
            Some(waiting) => {
                self.holders = Holders::Writing;
                Some(Grant::Write(waiting))
            }
            None => {
                self.holders = Holders::Unlocked;
                None
            }
        }
    }
}
