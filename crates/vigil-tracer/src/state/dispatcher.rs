use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::event::{Event, EventKey, EventKind};

/// Callback invoked for every matching event.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// ID of a registration made on an [EventDispatcher].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Value filter of a registration, for a single event kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event of the kind matches.
    #[default]
    Any,

    /// Only events whose [key](Event::key) is listed match.
    Include(Vec<EventKey>),

    /// Only events whose [key](Event::key) is not listed match.
    Exclude(Vec<EventKey>),
}

impl EventFilter {
    fn accepts(&self, key: &EventKey) -> bool {
        match self {
            Self::Any => true,
            Self::Include(keys) => keys.contains(key),
            Self::Exclude(keys) => !keys.contains(key),
        }
    }
}

/// Event kinds (and their value filters) a registration is interested in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscription {
    kinds: HashMap<EventKind, EventFilter>,
}

impl Subscription {
    /// Creates an empty subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a subscription to every event of the given kinds.
    pub fn to(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().map(|k| (k, EventFilter::Any)).collect(),
        }
    }

    /// Creates a subscription to every event.
    pub fn all() -> Self {
        Self::to(EventKind::ALL)
    }

    /// Adds interest in the given event kind, filtered by value.
    pub fn with(mut self, kind: EventKind, filter: EventFilter) -> Self {
        self.kinds.insert(kind, filter);
        self
    }

    /// Returns whether the subscription matches the given event.
    pub fn accepts(&self, event: &Event) -> bool {
        self.kinds
            .get(&event.kind())
            .is_some_and(|filter| filter.accepts(&event.key()))
    }

    fn without(&self, kinds: &HashSet<EventKind>) -> Self {
        Self {
            kinds: self
                .kinds
                .iter()
                .filter(|(kind, _)| !kinds.contains(kind))
                .map(|(kind, filter)| (*kind, filter.clone()))
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

struct Registrant {
    callback: Callback,
    subscription: Subscription,
    single_use: bool,
    upstream_id: Option<RegistrationId>,
}

type Registrants = Mutex<IndexMap<RegistrationId, Registrant>>;

/// Typed event bus.
///
/// A dispatcher may be chained to an upstream one: registrations made
/// downstream also receive the events fired upstream, except for the event
/// kinds the downstream dispatcher
/// [overrides](Self::register_chain_override).
pub struct EventDispatcher {
    registrants: Arc<Registrants>,
    next_id: AtomicU64,
    upstream: Option<Arc<EventDispatcher>>,
    overrides: Mutex<HashSet<EventKind>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Creates a standalone dispatcher.
    pub fn new() -> Self {
        Self {
            registrants: Arc::default(),
            next_id: AtomicU64::new(0),
            upstream: None,
            overrides: Mutex::default(),
        }
    }

    /// Creates a dispatcher chained to `upstream`.
    pub fn chained(upstream: Arc<EventDispatcher>) -> Self {
        Self {
            upstream: Some(upstream),
            ..Self::new()
        }
    }

    /// Stops forwarding the given event kinds from the upstream dispatcher,
    /// for every registration made afterwards.
    pub fn register_chain_override(&self, kinds: impl IntoIterator<Item = EventKind>) {
        self.overrides.lock().extend(kinds);
    }

    /// Registers a callback for the events matching `subscription`.
    ///
    /// A single-use registration is removed after its first invocation.
    pub fn register(
        &self,
        callback: Callback,
        subscription: Subscription,
        single_use: bool,
    ) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let upstream_id = self.upstream.as_ref().and_then(|upstream| {
            let forwarded = subscription.without(&self.overrides.lock());
            if forwarded.is_empty() {
                return None;
            }

            let registrants = Arc::downgrade(&self.registrants);
            let callback = callback.clone();

            let forward: Callback = Arc::new(move |event| {
                callback(event);
                if single_use {
                    remove_local(&registrants, id);
                }
            });

            Some(upstream.register(forward, forwarded, single_use))
        });

        self.registrants.lock().insert(
            id,
            Registrant {
                callback,
                subscription,
                single_use,
                upstream_id,
            },
        );

        id
    }

    /// Removes a registration.
    ///
    /// Returns whether the registration existed.
    pub fn remove(&self, id: RegistrationId) -> bool {
        let Some(registrant) = self.registrants.lock().shift_remove(&id) else {
            return false;
        };

        if let (Some(upstream), Some(upstream_id)) = (&self.upstream, registrant.upstream_id) {
            upstream.remove(upstream_id);
        }

        true
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.registrants.lock().len()
    }

    /// Returns whether there is no registration.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every registered callback matching the event.
    ///
    /// Callbacks are invoked outside of any lock, in registration order. A
    /// panicking callback is discarded without affecting the others.
    pub fn fire(&self, event: &Event) {
        let matching = self
            .registrants
            .lock()
            .iter()
            .filter(|(_, r)| r.subscription.accepts(event))
            .map(|(id, r)| (*id, r.callback.clone(), r.single_use))
            .collect::<Vec<_>>();

        for (id, callback, single_use) in matching {
            if single_use && !self.remove(id) {
                // already consumed by a concurrent fire
                continue;
            }

            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(kind = ?event.kind(), "event listener panicked");
            }
        }
    }
}

fn remove_local(registrants: &Weak<Registrants>, id: RegistrationId) {
    if let Some(registrants) = registrants.upgrade() {
        registrants.lock().shift_remove(&id);
    }
}
