use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::dispatcher::EventDispatcher;
use super::event::Event;

/// State of the debugger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebuggerState {
    /// The debuggee runs freely.
    Running,

    /// At least one thread is parked on a break.
    Broken,

    /// Like [Broken](Self::Broken), while the operator analyzes an exception.
    Analyze,

    /// The debugger is detached from the debuggee.
    Detached,

    /// The debugger is being detached.
    Detaching,

    /// The debuggee is being spawned.
    Spawning,

    /// The debugger is being attached.
    Attaching,
}

impl DebuggerState {
    /// Returns whether threads are parked in this state.
    pub const fn is_broken(self) -> bool {
        matches!(self, Self::Broken | Self::Analyze)
    }

    /// Returns whether the debugger is (being) detached in this state.
    pub const fn is_detached(self) -> bool {
        matches!(self, Self::Detached | Self::Detaching)
    }
}

impl fmt::Display for DebuggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Broken => "broken",
            Self::Analyze => "analyze",
            Self::Detached => "detached",
            Self::Detaching => "detaching",
            Self::Spawning => "spawning",
            Self::Attaching => "attaching",
        };

        f.write_str(name)
    }
}

/// Owner of the process-wide [DebuggerState].
///
/// Every transition is appended to a history, so that waiters woken late
/// still observe the transitions they were waiting for. Entries are dropped
/// once no registered waiter may need them.
pub struct StateCoordinator {
    inner: Mutex<CoordinatorInner>,
    changed: Condvar,
    dispatcher: Arc<EventDispatcher>,
    poll_interval: Duration,
}

struct CoordinatorInner {
    state: DebuggerState,
    index: u64,
    history: VecDeque<(u64, DebuggerState)>,

    /// Number of waiters registered at every index.
    waiters: BTreeMap<u64, usize>,
}

impl CoordinatorInner {
    fn register(&mut self, index: u64) {
        *self.waiters.entry(index).or_default() += 1;
    }

    fn unregister(&mut self, index: u64) {
        if let Some(count) = self.waiters.get_mut(&index) {
            *count -= 1;
            if *count == 0 {
                self.waiters.remove(&index);
            }
        }
    }

    fn collect_garbage(&mut self) {
        let oldest = self.waiters.keys().next().copied().unwrap_or(self.index);

        while self.history.front().is_some_and(|(index, _)| *index <= oldest) {
            self.history.pop_front();
        }
    }
}

impl StateCoordinator {
    /// Creates a coordinator in the [Running](DebuggerState::Running) state,
    /// broadcasting its transitions to `dispatcher`.
    ///
    /// Blocked waits wake up at least every `poll_interval`.
    pub fn new(dispatcher: Arc<EventDispatcher>, poll_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(CoordinatorInner {
                state: DebuggerState::Running,
                index: 0,
                history: VecDeque::new(),
                waiters: BTreeMap::new(),
            }),
            changed: Condvar::new(),
            dispatcher,
            poll_interval,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> DebuggerState {
        self.inner.lock().state
    }

    /// Returns the index of the last transition.
    pub fn index(&self) -> u64 {
        self.inner.lock().index
    }

    /// Returns the number of registered waiters.
    pub fn waiters(&self) -> usize {
        self.inner.lock().waiters.values().sum()
    }

    /// Returns the number of transitions kept in history.
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Transitions to the given state, wakes up every waiter, then
    /// broadcasts a [StateChanged](Event::StateChanged) event.
    ///
    /// No transition is refused.
    pub fn set_state(&self, state: DebuggerState) {
        self.transition(state);
        self.announce(state);
    }

    /// Transitions to the given state and wakes up every waiter, without
    /// broadcasting.
    pub(crate) fn transition(&self, state: DebuggerState) -> u64 {
        let mut inner = self.inner.lock();

        inner.index += 1;
        inner.state = state;

        let index = inner.index;
        inner.history.push_back((index, state));
        inner.collect_garbage();

        self.changed.notify_all();

        index
    }

    pub(crate) fn announce(&self, state: DebuggerState) {
        tracing::info!(%state, "state changed");

        self.dispatcher.fire(&Event::StateChanged { state });
    }

    /// Blocks until the state becomes one of `targets`, and returns it.
    ///
    /// Returns immediately if the current state is already a target.
    pub fn wait_for_state(&self, targets: &[DebuggerState]) -> DebuggerState {
        let waiter = {
            let mut inner = self.inner.lock();
            if targets.contains(&inner.state) {
                return inner.state;
            }

            self.register_waiter(&mut inner)
        };

        waiter.wait(targets)
    }

    /// Registers a waiter at the current transition index.
    ///
    /// The waiter observes every transition made after this call, even if
    /// it starts waiting later.
    pub fn waiter(&self) -> Waiter<'_> {
        self.register_waiter(&mut self.inner.lock())
    }

    fn register_waiter(&self, inner: &mut CoordinatorInner) -> Waiter<'_> {
        let index = inner.index;
        inner.register(index);

        Waiter {
            coordinator: self,
            index,
        }
    }
}

/// Waiter registered on a [StateCoordinator].
///
/// It is unregistered on drop.
pub struct Waiter<'a> {
    coordinator: &'a StateCoordinator,
    index: u64,
}

impl Waiter<'_> {
    /// Blocks until a transition to one of `targets` has been made since the
    /// waiter was registered, and returns the matching state.
    ///
    /// Returns immediately if the current state is one of `targets`.
    pub fn wait(mut self, targets: &[DebuggerState]) -> DebuggerState {
        let coordinator = self.coordinator;
        let mut inner = coordinator.inner.lock();

        loop {
            let found = inner
                .history
                .iter()
                .filter(|(index, _)| *index > self.index)
                .find(|(_, state)| targets.contains(state))
                .map(|(_, state)| *state)
                .or_else(|| targets.contains(&inner.state).then_some(inner.state));

            let seen = inner.index;
            if seen != self.index {
                inner.unregister(self.index);
                inner.register(seen);
                self.index = seen;
            }

            if let Some(state) = found {
                return state;
            }

            coordinator
                .changed
                .wait_for(&mut inner, coordinator.poll_interval);
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut inner = self.coordinator.inner.lock();

        inner.unregister(self.index);
        inner.collect_garbage();
    }
}
