//! Critical sections that suspend tasks instead of blocking threads.
//!
//! A [`Task`] is a unit of sequential code that can suspend itself at any call depth and be
//! resumed later, from any thread, with a value or an error. On top of that this crate
//! provides sections, locks whose waiters are suspended tasks rather than parked threads:
//!
//! * [`ExclusiveSection`] runs one operation at a time, in arrival order.
//! * [`ReadPrioritySection`] lets readers share the section, letting new readers join even
//!   while a writer waits.
//! * [`WritePrioritySection`] lets readers share the section but holds new readers back as
//!   soon as a writer is waiting.
//!
//! Operations are closures. An uncontended operation runs inline on the caller's thread.
//! A contended one is queued, and when its turn comes it runs as a new task on the
//! [`Executor`] the caller supplied; the caller is then resumed with its result.
//!
//! # Example
//!
//! ```rust
//! use cosections::{bridge, ExclusiveSection, SharedExecutor, ThreadPoolExecutor};
//! use std::sync::{mpsc::channel, Arc};
//!
//! let executor: SharedExecutor = ThreadPoolExecutor::new().unwrap();
//! let section = Arc::new(ExclusiveSection::new());
//! let (sender, receiver) = channel();
//!
//! for i in 0..4 {
//!     let section = section.clone();
//!     let sender = sender.clone();
//!     let caller = executor.clone();
//!     bridge::submit(&executor, move || {
//!         let doubled = section.call(&caller, move || Ok(i * 2))?;
//!         sender.send(doubled)?;
//!         Ok(())
//!     })
//!     .unwrap();
//! }
//!
//! let mut results: Vec<i32> = receiver.iter().take(4).collect();
//! results.sort();
//! assert_eq!(results, vec![0, 2, 4, 6]);
//! ```
//!
//! # Usage
//!
//! * [`bridge::submit`], [`bridge::delay`] and [`bridge::repeat_at_fixed_rate`] start new
//!   tasks on an executor
//! * [`bridge::offload_blocking`], [`bridge::sleep`] and [`bridge::await_external`] suspend
//!   the current task while something else happens
//! * [`bridge::run_blockingly`] runs a task from plain code and waits for its result
//! * [`suspend`] and [`suspend_then`] are the primitives all of the above are built on
//!
//! # Errors
//!
//! Failures of user operations are [`anyhow::Error`]s and reach exactly the caller waiting
//! on them. The crate's own failures are [`Error`]s, which convert into `anyhow::Error` and
//! can be recovered with `downcast_ref`. An error escaping a task started by the bridge has
//! nobody waiting for it: it is logged and its executor is shut down, see [`bridge::fatal`].
//!
//! # Warning
//! * Every task is backed by its own OS thread, parked while the task is suspended. A task
//!   that is never resumed keeps its thread.
//! * Calling a section while it is held from outside a task fails with
//!   [`Error::NotInTask`]. Uncontended calls work from anywhere.
//! * The thread that runs a granted operation resumes its caller, so callers may continue
//!   on a different thread than the one they suspended on.

pub mod bridge;
mod error;
mod executors;
mod sections;
mod shared;
mod task;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
pub use executors::{
    Executor, Job, ManualExecutor, PoolConfig, RepeatingJob, ScheduledHandle, SharedExecutor,
    ThreadPoolExecutor,
};
pub use sections::{ExclusiveSection, ReadPrioritySection, WritePrioritySection};
pub use task::{suspend, suspend_then, Task, TaskBuilder, TaskState};
