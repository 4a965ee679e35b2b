use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    error::Error,
    task::{suspend_then, Task},
};

/// Parks tasks by id so a test can decide exactly when each one continues.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    parked: Arc<Mutex<HashMap<u32, Task>>>,
}

impl Gate {
    /// Suspends the current task at gate `id`.
    pub(crate) fn stop(&self, id: u32) -> anyhow::Result<()> {
        let task = Task::current().ok_or(Error::NotInTask)?;
        let parked = self.parked.clone();
        suspend_then(move || {
            let previous = parked.lock().insert(id, task);
            assert!(previous.is_none(), "two tasks parked at gate {id}");
        })
    }

    /// Resumes the task parked at gate `id` and waits for it to suspend or finish.
    pub(crate) fn start(&self, id: u32) {
        let task = self.parked.lock().remove(&id);
        let task = task.unwrap_or_else(|| panic!("no task parked at gate {id}"));
        task.resume(()).unwrap();
    }

    pub(crate) fn is_parked(&self, id: u32) -> bool {
        self.parked.lock().contains_key(&id)
    }
}

/// An ordered record of events, shared between tasks and the test.
#[derive(Clone, Default)]
pub(crate) struct Record<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone> Record<T> {
    pub(crate) fn push(&self, event: T) {
        self.events.lock().push(event);
    }

    pub(crate) fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }
}
