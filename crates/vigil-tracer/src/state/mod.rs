mod coordinator;
mod dispatcher;
mod event;
mod queue;

pub use self::coordinator::{DebuggerState, StateCoordinator, Waiter};
pub use self::dispatcher::{Callback, EventDispatcher, EventFilter, RegistrationId, Subscription};
pub use self::event::{BreakpointAction, Event, EventKey, EventKind};
pub use self::queue::EventQueue;
