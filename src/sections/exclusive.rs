use std::{collections::VecDeque, fmt, sync::Arc};

use super::{waiter, Finally, Waiting};
use crate::{executors::SharedExecutor, shared::Ledger, task::suspend_then};

/// Runs one operation at a time, granting waiters in the order they arrived.
///
/// # Example
///
/// ```rust
/// use cosections::{bridge, ExclusiveSection, ManualExecutor, SharedExecutor};
/// use std::sync::Arc;
///
/// let executor: SharedExecutor = ManualExecutor::new();
/// let section = Arc::new(ExclusiveSection::new());
/// let caller = executor.clone();
/// let answer = bridge::run_blockingly(move || section.call(&caller, || Ok(21 * 2))).unwrap();
/// assert_eq!(answer, 42);
/// ```
pub struct ExclusiveSection {
    ledger: Arc<Ledger<State>>,
}

struct State {
    held: bool,
    queue: VecDeque<Waiting>,
}

impl ExclusiveSection {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(Ledger::new(State {
                held: false,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Runs `operation` once no other operation holds the section and returns its result.
    ///
    /// Uncontended, `operation` runs right away on the calling thread. Otherwise the calling
    /// task suspends until its turn comes, and `operation` runs as a new task on `executor`.
    /// The section is released whether `operation` succeeds, fails or panics.
    ///
    /// # Errors
    ///
    /// * whatever `operation` fails with
    /// * [`Error::NotInTask`](crate::Error::NotInTask) if the section is held and the
    ///   caller is not a task
    /// * [`Error::ExecutorShutdown`](crate::Error::ExecutorShutdown) if `executor` refused
    ///   the operation when its turn came
    pub fn call<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        let mut state = self.ledger.lock();
        if !state.held {
            state.held = true;
            drop(state);
            let _release = Finally::new(|| release(&self.ledger));
            return operation();
        }

        let task = waiter()?;
        log::debug!("task {} waiting on exclusive section", task.id());
        let waiting = Waiting::new(executor, task, operation);
        suspend_then(move || {
            state.queue.push_back(waiting);
            drop(state);
        })
    }

    /// Callers currently waiting for the section.
    pub fn waiting(&self) -> usize {
        self.ledger.lock().queue.len()
    }

    pub fn is_held(&self) -> bool {
        self.ledger.lock().held
    }
}

impl Default for ExclusiveSection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExclusiveSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.ledger.lock();
        f.debug_struct("ExclusiveSection")
            .field("held", &state.held)
            .field("waiting", &state.queue.len())
            .finish()
    }
}

/// Hands the section to the next waiter, or frees it.
fn release(ledger: &Arc<Ledger<State>>) {
    let next = {
        let mut state = ledger.lock();
        let next = state.queue.pop_front();
        state.held = next.is_some();
        next
    };

    if let Some(waiting) = next {
        let ledger = ledger.clone();
        waiting.dispatch(move || release(&ledger));
    }
}
