mod eval;
mod frame;

pub use self::eval::{EvalError, Evaluator};
pub use self::frame::{Frame, FrameId, Locals, Namespace};

/// Trait implementing the instrumentation interface of a host runtime.
///
/// The host runtime invokes [TraceEngine::dispatch](crate::tracer::TraceEngine::dispatch)
/// synchronously, on the debuggee thread, at every statement boundary of the
/// frames it instruments.
pub trait Runtime: Send + Sync + 'static {
    /// Type of the debuggee's frames.
    type Frame: Frame;

    /// Evaluator of breakpoint predicates.
    type Evaluator: Evaluator<Value = <Self::Frame as Namespace>::Value>;

    /// Installs the given instrumentation variant on a frame.
    ///
    /// # Note
    ///
    /// This may be called from any thread, not only from the thread owning
    /// the frame.
    fn install(&self, frame: &Self::Frame, instrumentation: Instrumentation);

    /// Returns the predicate evaluator.
    fn evaluator(&self) -> &Self::Evaluator;
}

/// Instrumentation variant installed on a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instrumentation {
    /// The frame has no possible interest: statement callbacks may be skipped.
    Idle,

    /// Statement callbacks check for breakpoints and break requests.
    Watch,
}

/// Statement-boundary event reported by the host runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// A new frame starts running its scope.
    EnterScope,

    /// A frame is about to execute a statement.
    Statement,

    /// A frame is about to leave its scope.
    LeaveScope,

    /// A frame has raised (or propagated) an exception.
    Exception(ExceptionInfo),
}

impl TraceEvent {
    /// Short label of the event.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::EnterScope => "enter",
            Self::Statement => "statement",
            Self::LeaveScope => "leave",
            Self::Exception(_) => "exception",
        }
    }
}

/// Information about an exception raised by the debuggee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Human readable description of the exception.
    pub description: String,

    /// Whether the host runtime knows no handler will catch the exception.
    pub unhandled: bool,
}
