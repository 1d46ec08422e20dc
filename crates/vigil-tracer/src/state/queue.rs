use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::event::Event;

/// Bounded feed of events, polled by the operator.
///
/// Every pushed event gets an increasing index (starting at 1). When the
/// feed is full, the oldest events are dropped.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    pushed: Condvar,
    capacity: usize,
}

struct QueueInner {
    events: VecDeque<Event>,
    last_index: u64,
}

impl EventQueue {
    /// Creates an empty feed keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(capacity.min(64)),
                last_index: 0,
            }),
            pushed: Condvar::new(),
            capacity,
        }
    }

    /// Appends an event and wakes up every waiter.
    pub fn push(&self, event: Event) {
        let mut inner = self.inner.lock();

        if inner.events.len() == self.capacity {
            inner.events.pop_front();
        }

        inner.events.push_back(event);
        inner.last_index += 1;

        self.pushed.notify_all();
    }

    /// Returns the index of the most recent event.
    pub fn last_index(&self) -> u64 {
        self.inner.lock().last_index
    }

    /// Returns the events pushed after `last_index`, along with the index of
    /// the most recent one.
    ///
    /// Waits up to `timeout` for such an event to be pushed. Events dropped
    /// from a full feed are silently skipped.
    pub fn wait_for_event(&self, timeout: Duration, last_index: u64) -> (u64, Vec<Event>) {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        while inner.last_index <= last_index {
            if self.pushed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }

        let pending = inner.last_index.saturating_sub(last_index);
        let pending = usize::try_from(pending).unwrap_or(usize::MAX);

        let skip = inner.events.len().saturating_sub(pending);
        let events = inner.events.iter().skip(skip).cloned().collect();

        (inner.last_index, events)
    }
}
