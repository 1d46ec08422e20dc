use super::DebuggerState;
use crate::breakpoint::Breakpoint;
use crate::runtime::ExceptionInfo;
use crate::tracer::StackEntry;

/// Event broadcast by the engine.
///
/// Events never share state with the engine: every payload is a detached
/// copy taken when the event was fired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The debugger state changed.
    StateChanged {
        /// New state.
        state: DebuggerState,
    },

    /// Breakpoints were set, toggled or removed.
    BreakpointChanged {
        /// Kind of change.
        action: BreakpointAction,

        /// Copies of the breakpoints affected by the change.
        breakpoints: Vec<Breakpoint>,
    },

    /// A thread entered the broken state without becoming the current one.
    ThreadBroke {
        /// ID of the broken thread.
        thread_id: u64,
    },

    /// Full resynchronization of the current thread's stack.
    StackSynced {
        /// ID of the current thread.
        thread_id: u64,

        /// Stack of the current thread, innermost frame first.
        stack: Vec<StackEntry>,
    },

    /// The operator focus moved to another broken thread.
    FocusChanged {
        /// ID of the newly focused thread.
        thread_id: u64,
    },

    /// Trapping of unhandled exceptions was toggled.
    TrapExceptionsChanged {
        /// Whether unhandled exceptions now break.
        enabled: bool,
    },

    /// A thread broke on an unhandled exception.
    ExceptionTrapped {
        /// ID of the broken thread.
        thread_id: u64,

        /// The trapped exception.
        exception: ExceptionInfo,
    },

    /// A thread unwound its outermost frame.
    ThreadExited {
        /// ID of the exited thread.
        thread_id: u64,
    },
}

/// Kind of an [Event], used as registration key by the
/// [EventDispatcher](super::EventDispatcher).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// [Event::StateChanged].
    StateChanged,
    /// [Event::BreakpointChanged].
    BreakpointChanged,
    /// [Event::ThreadBroke].
    ThreadBroke,
    /// [Event::StackSynced].
    StackSynced,
    /// [Event::FocusChanged].
    FocusChanged,
    /// [Event::TrapExceptionsChanged].
    TrapExceptionsChanged,
    /// [Event::ExceptionTrapped].
    ExceptionTrapped,
    /// [Event::ThreadExited].
    ThreadExited,
}

impl EventKind {
    /// Every event kind.
    pub const ALL: [Self; 8] = [
        Self::StateChanged,
        Self::BreakpointChanged,
        Self::ThreadBroke,
        Self::StackSynced,
        Self::FocusChanged,
        Self::TrapExceptionsChanged,
        Self::ExceptionTrapped,
        Self::ThreadExited,
    ];
}

/// Comparable value of an [Event], matched by include/exclude filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// The state of a [Event::StateChanged].
    State(DebuggerState),

    /// The action of a [Event::BreakpointChanged].
    Action(BreakpointAction),

    /// The thread ID of a thread related event.
    Thread(u64),

    /// The flag of a [Event::TrapExceptionsChanged].
    Enabled(bool),
}

/// Kind of breakpoint change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointAction {
    /// Breakpoints were set or modified.
    Set,
    /// Breakpoints were enabled.
    Enable,
    /// Breakpoints were disabled.
    Disable,
    /// Breakpoints were removed.
    Remove,
}

impl Event {
    /// Returns the kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::BreakpointChanged { .. } => EventKind::BreakpointChanged,
            Self::ThreadBroke { .. } => EventKind::ThreadBroke,
            Self::StackSynced { .. } => EventKind::StackSynced,
            Self::FocusChanged { .. } => EventKind::FocusChanged,
            Self::TrapExceptionsChanged { .. } => EventKind::TrapExceptionsChanged,
            Self::ExceptionTrapped { .. } => EventKind::ExceptionTrapped,
            Self::ThreadExited { .. } => EventKind::ThreadExited,
        }
    }

    /// Returns the comparable value of this event.
    pub const fn key(&self) -> EventKey {
        match self {
            Self::StateChanged { state } => EventKey::State(*state),
            Self::BreakpointChanged { action, .. } => EventKey::Action(*action),
            Self::ThreadBroke { thread_id }
            | Self::StackSynced { thread_id, .. }
            | Self::FocusChanged { thread_id }
            | Self::ExceptionTrapped { thread_id, .. }
            | Self::ThreadExited { thread_id } => EventKey::Thread(*thread_id),
            Self::TrapExceptionsChanged { enabled } => EventKey::Enabled(*enabled),
        }
    }
}
