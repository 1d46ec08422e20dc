/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A scope resolution error occurred (e.g., invalid scope).
    #[error(transparent)]
    Symbol(#[from] vigil_symbol::Error),

    /// No traced thread has the given ID.
    #[error("thread {0} not found")]
    ThreadNotFound(u64),

    /// No thread is currently traced.
    #[error("no traced thread")]
    NoThreads,

    /// The thread has fully unwound its call stack.
    #[error("thread {0} is done")]
    ThreadDone(u64),

    /// The operation requires the debugger to be broken.
    #[error("debugger is not broken")]
    DebuggerNotBroken,

    /// The frame index is beyond the live stack depth.
    #[error("invalid frame index {0}")]
    InvalidFrame(usize),

    /// The thread has not raised any exception.
    #[error("no exception found")]
    NoExceptionFound,

    /// An argument of the operation is invalid.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The host runtime refused an operation.
    #[error(transparent)]
    Runtime(Box<dyn std::error::Error + Send + Sync>),

    /// Engine configuration parsing error.
    #[error(transparent)]
    Config(#[from] knus::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
