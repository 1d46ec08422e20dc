use crate::breakpoint::Breakpoint;
use crate::runtime::ExceptionInfo;
use crate::state::{BreakpointAction, DebuggerState, Event};
use crate::tracer::StackEntry;

/// Trait for implementing an engine event handler.
///
/// Every function is called synchronously from the thread firing the event,
/// which may be a debuggee thread. Errors and panics are logged and
/// discarded.
pub trait EventHandler: Send + Sync + 'static {
    /// Error returned by this event handler.
    type Error: std::error::Error;

    /// Function called when the debugger state changed.
    fn state_changed(&self, _state: DebuggerState) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when breakpoints were set, toggled or removed.
    fn breakpoint_changed(
        &self,
        _action: BreakpointAction,
        _breakpoints: &[Breakpoint],
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when a thread is parked without becoming the current
    /// thread.
    fn thread_broke(&self, _thread_id: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called with the stack of the current thread, when it
    /// becomes current or its stack changed while broken.
    fn stack_synced(&self, _thread_id: u64, _stack: &[StackEntry]) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when the operator focus moved to another thread.
    fn focus_changed(&self, _thread_id: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when a thread broke on an unhandled exception.
    fn exception_trapped(
        &self,
        _thread_id: u64,
        _exception: &ExceptionInfo,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when trapping of unhandled exceptions was toggled.
    fn trap_exceptions_changed(&self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when a thread unwound its outermost frame.
    fn thread_exited(&self, _thread_id: u64) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Event handler ignoring every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    type Error = std::convert::Infallible;
}

/// Calls the function of `handler` matching the event.
pub(crate) fn forward<H: EventHandler>(handler: &H, event: &Event) {
    let res = match event {
        Event::StateChanged { state } => handler.state_changed(*state),
        Event::BreakpointChanged {
            action,
            breakpoints,
        } => handler.breakpoint_changed(*action, breakpoints),
        Event::ThreadBroke { thread_id } => handler.thread_broke(*thread_id),
        Event::StackSynced { thread_id, stack } => handler.stack_synced(*thread_id, stack),
        Event::FocusChanged { thread_id } => handler.focus_changed(*thread_id),
        Event::TrapExceptionsChanged { enabled } => handler.trap_exceptions_changed(*enabled),
        Event::ExceptionTrapped {
            thread_id,
            exception,
        } => handler.exception_trapped(*thread_id, exception),
        Event::ThreadExited { thread_id } => handler.thread_exited(*thread_id),
    };

    if let Err(e) = res {
        tracing::warn!(kind = ?event.kind(), error = %e, "event handler failed");
    }
}
