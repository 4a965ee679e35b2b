//! Suspendable tasks.
//!
//! A [`Task`] wraps a body that can pause itself with [`suspend`] at any call depth and be
//! continued later, from any thread, with [`Task::resume`] or [`Task::resume_with_error`].
//! Each task is backed by its own thread which stays parked while the task is suspended;
//! the resumer and the task never run at the same time.

mod handoff;


use std::{
    any::type_name,
    cell::RefCell,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use parking_lot::Mutex;

use crate::error::{panic_message, Error, Result};

pub(crate) use handoff::{Payload, Resumption};
use handoff::{AfterSuspend, Handoff};

type Body = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Task>> = const { RefCell::new(None) };
}

/// Lifecycle of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Running,
    Suspended,
    Finished,
}

/// A resumable unit of execution.
///
/// Cloning a `Task` clones the handle; every clone refers to the same task.
///
/// # Example
///
/// ```rust
/// use cosections::{suspend, Task};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(None));
/// let out = seen.clone();
/// let task = Task::new(move || {
///     let value: i32 = suspend()?;
///     *out.lock().unwrap() = Some(value);
///     Ok(())
/// });
///
/// task.start().unwrap();
/// task.resume(4).unwrap();
/// assert!(task.is_finished());
/// assert_eq!(*seen.lock().unwrap(), Some(4));
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    name: Option<String>,
    stack_size: Option<usize>,
    handoff: Handoff,
    body: Mutex<Option<Body>>,
}

impl Task {
    /// Creates a task for `body`. Nothing runs until [`Task::start`] is called.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        TaskBuilder::new().build(body)
    }

    pub fn builder() -> TaskBuilder {
        TaskBuilder::new()
    }

    /// The task running on the calling thread, if any.
    pub fn current() -> Option<Task> {
        CURRENT.with(|current| current.borrow().clone())
    }
}

impl Task {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn state(&self) -> TaskState {
        self.inner.handoff.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }
}

impl Task {
    /// Runs the task until it first suspends or finishes.
    pub fn start(&self) -> Result<()> {
        self.resume(())
    }

    /// Starts the task, or continues a suspended task so that its pending [`suspend`]
    /// call returns `value`. Returns once the task suspends again or finishes.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] if the task is running or finished
    /// * [`Error::Failed`] or [`Error::Panicked`] if the body finished with a failure
    pub fn resume<T: Send + 'static>(&self, value: T) -> Result<()> {
        self.resume_with(Resumption::Value(Box::new(value)))
    }

    /// Continues a suspended task so that its pending [`suspend`] call fails with `error`.
    pub fn resume_with_error(&self, error: impl Into<anyhow::Error>) -> Result<()> {
        self.resume_with(Resumption::Error(error.into()))
    }

    pub(crate) fn resume_with(&self, resumption: Resumption) -> Result<()> {
        log::trace!("resuming task {}", self.id());
        self.inner.handoff.resume(resumption, || self.spawn())
    }

    fn spawn(&self) -> Result<()> {
        let Some(body) = self.inner.body.lock().take() else {
            return Err(Error::InvalidState {
                found: TaskState::Finished,
            });
        };
        let name = match &self.inner.name {
            Some(name) => name.clone(),
            None => format!("task #{}", self.inner.id),
        };
        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.inner.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let task = self.clone();
        builder.spawn(move || task.run(body))?;
        Ok(())
    }

    fn run(self, body: Body) {
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));

        let outcome = match catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(Error::Failed(error)),
            Err(payload) => Err(Error::Panicked(panic_message(payload))),
        };

        CURRENT.with(|current| current.borrow_mut().take());
        self.inner.handoff.finish(outcome);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Configures the thread backing a [`Task`].
#[derive(Debug, Default, Clone)]
pub struct TaskBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the task and its thread.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size in bytes for the task's thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn build<F>(self, body: F) -> Task
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Task {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: self.name,
                stack_size: self.stack_size,
                handoff: Handoff::new(),
                body: Mutex::new(Some(Box::new(body))),
            }),
        }
    }
}

/// Suspends the current task until it is resumed.
///
/// Returns the value passed to [`Task::resume`], or the error passed to
/// [`Task::resume_with_error`].
///
/// # Errors
///
/// * [`Error::NotInTask`] when called outside a task
/// * [`Error::UnexpectedPayload`] when the resumed value is not a `T`
pub fn suspend<T: 'static>() -> anyhow::Result<T> {
    suspend_with(None)
}

/// Suspends the current task, then runs `after` on the resuming thread once the suspension
/// is complete, before the pending `resume` call returns.
///
/// Use this when `after` hands the task to something that may resume it from another
/// thread: the task is guaranteed to be resumable by the time `after` runs. `after` must
/// not assume it has the task to itself; it may already have been resumed elsewhere.
/// Outside a task `after` is dropped without running.
pub fn suspend_then<T, F>(after: F) -> anyhow::Result<T>
where
    T: 'static,
    F: FnOnce() + Send + 'static,
{
    suspend_with(Some(Box::new(after)))
}

fn suspend_with<T: 'static>(after: Option<AfterSuspend>) -> anyhow::Result<T> {
    let task = Task::current().ok_or(Error::NotInTask)?;
    log::trace!("task {} suspending", task.id());

    match task.inner.handoff.suspend(after) {
        Resumption::Value(payload) => match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(Error::UnexpectedPayload {
                expected: type_name::<T>(),
            }
            .into()),
        },
        Resumption::Error(error) => Err(error),
    }
}
