use crate::task::TaskState;

/// Errors raised by tasks, executors and the bridge between them.
///
/// Failures of user supplied operations travel as [`anyhow::Error`]; this enum covers the
/// crate's own failure modes. It converts into `anyhow::Error`, so callers waiting on a
/// section can inspect it with `downcast_ref::<cosections::Error>()`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The task cannot accept a resumption in its current state.
    #[error("cannot resume a task that is {found:?}")]
    InvalidState { found: TaskState },

    /// A suspending operation was called from a thread that is not running a task.
    #[error("not running inside a task")]
    NotInTask,

    /// The resumed value does not have the type the suspension point asked for.
    #[error("resumed with a value that is not a `{expected}`")]
    UnexpectedPayload { expected: &'static str },

    /// The executor has shut down and no longer accepts work.
    #[error("executor has shut down and no longer accepts work")]
    ExecutorShutdown,

    /// Fixed rate repetition needs a non-zero interval.
    #[error("repeat interval must be greater than zero")]
    ZeroInterval,

    /// A task body or section operation panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The OS refused to spawn the thread backing a task.
    #[error("failed to spawn task thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The completer side of a completion was dropped without a value.
    #[error("completion was abandoned before a value was delivered")]
    Abandoned,

    /// A task body returned an error.
    #[error(transparent)]
    Failed(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Renders a `catch_unwind` payload as text.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "non-string panic payload".to_owned(),
        },
    }
}
