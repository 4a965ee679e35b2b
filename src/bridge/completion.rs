use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::Mutex;

use crate::{
    error::Error,
    task::{suspend_then, Resumption, Task},
};

type Callback<T> = Box<dyn FnOnce(anyhow::Result<T>) + Send>;

/// Creates a single value channel: the [`Completer`] resolves it, the [`Completion`]
/// observes the outcome.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            outcome: None,
            listener: None,
        }),
    });
    (
        Completer {
            shared: Some(shared.clone()),
        },
        Completion { shared },
    )
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
}

struct Slot<T> {
    outcome: Option<anyhow::Result<T>>,
    listener: Option<Listener<T>>,
}

enum Listener<T> {
    Callback(Callback<T>),
    Waker(Waker),
}

/// Resolves a [`Completion`]. Dropping it without completing fails the completion with
/// [`Error::Abandoned`].
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Completer<T> {
    pub fn complete(mut self, outcome: anyhow::Result<T>) {
        if let Some(shared) = self.shared.take() {
            deliver(&shared, outcome);
        }
    }

    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: impl Into<anyhow::Error>) {
        self.complete(Err(error.into()));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            deliver(&shared, Err(Error::Abandoned.into()));
        }
    }
}

fn deliver<T>(shared: &Shared<T>, outcome: anyhow::Result<T>) {
    let mut slot = shared.slot.lock();
    match slot.listener.take() {
        Some(Listener::Callback(callback)) => {
            drop(slot);
            callback(outcome);
        }
        Some(Listener::Waker(waker)) => {
            slot.outcome = Some(outcome);
            drop(slot);
            waker.wake();
        }
        None => slot.outcome = Some(outcome),
    }
}

/// The receiving half of [`completion`]: a single value or error that arrives later.
///
/// It can be consumed three ways: with a callback through [`Completion::on_complete`],
/// from inside a task through [`await_external`], or as a [`Future`].
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Completion<T> {
    /// Calls `callback` with the outcome once it is known. If it already is, `callback`
    /// runs immediately on the calling thread; otherwise it runs on the completing thread.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(anyhow::Result<T>) + Send + 'static,
    {
        let mut slot = self.shared.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => {
                drop(slot);
                callback(outcome);
            }
            None => slot.listener = Some(Listener::Callback(Box::new(callback))),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.shared.slot.lock().outcome.is_some()
    }
}

impl<T> Future for Completion<T> {
    type Output = anyhow::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.listener = Some(Listener::Waker(cx.waker().clone()));
                Poll::Pending
            }
        }
    }
}

/// Suspends the current task until `completion` resolves, then returns its value or error.
///
/// The task is resumed on the thread that completes `completion`, or immediately if it
/// already has an outcome.
///
/// # Errors
///
/// * [`Error::NotInTask`] when called outside a task
/// * the completion's error, or [`Error::Abandoned`] if its completer was dropped
pub fn await_external<T: Send + 'static>(completion: Completion<T>) -> anyhow::Result<T> {
    let task = Task::current().ok_or(Error::NotInTask)?;

    suspend_then(move || {
        completion.on_complete(move |outcome| {
            let resumption = match outcome {
                Ok(value) => Resumption::Value(Box::new(value)),
                Err(error) => Resumption::Error(error),
            };
            if let Err(error) = task.resume_with(resumption) {
                log::error!("task {} failed after an external completion: {error:#}", task.id());
            }
        })
    })
}
