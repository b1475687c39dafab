//! Socket notifications and the listener registry.
//!
//! Two registration styles coexist, mirroring the usual socket surface:
//! a growable listener list per event type ([`Registry::add`]) and one
//! replaceable single-slot handler per type. Every subscriber registered
//! for a type fires on that event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::{CloseEvent, Payload};

/// Notification emitted by a socket.
#[derive(Debug, Clone)]
pub enum Event {
    /// First successful open.
    Open,
    /// Inbound payload, verbatim.
    Message(Payload),
    /// Terminal close, carrying the most recent close diagnostics if any.
    /// Fires exactly once; nothing follows it.
    Close(Option<CloseEvent>),
    /// Transport-level error. Informational; recovery is automatic.
    Error(String),
    /// A retry episode began. `None` diagnostics for a manual reconnect
    /// or a connect timeout.
    Down(Option<CloseEvent>),
    /// A retry episode ended in a successful open.
    Reopen,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Message(_) => EventKind::Message,
            Event::Close(_) => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::Down(_) => EventKind::Down,
            Event::Reopen => EventKind::Reopen,
        }
    }
}

/// Event types listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Close,
    Error,
    Down,
    Reopen,
}

/// Handle returned by [`SturdySocket::add_listener`](crate::SturdySocket::add_listener),
/// used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub(crate) type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    slots: HashMap<EventKind, Listener>,
}

/// Per-socket listener registry, shared between the handle and the
/// controller task.
#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn add(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .listeners
            .push((id, kind, listener));
        id
    }

    /// Returns `true` if a listener with this id was registered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().expect("listener registry poisoned");
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Replaces (or clears) the single-slot handler for `kind`.
    pub(crate) fn set_slot(&self, kind: EventKind, listener: Option<Listener>) {
        let mut inner = self.inner.lock().expect("listener registry poisoned");
        match listener {
            Some(listener) => {
                inner.slots.insert(kind, listener);
            }
            None => {
                inner.slots.remove(&kind);
            }
        }
    }

    /// Dispatches to every subscriber registered for the event's type.
    ///
    /// The subscriber list is snapshotted before any handler runs, so a
    /// handler may add or remove listeners, or call back into the socket,
    /// without deadlocking. List listeners fire in registration order,
    /// then the single-slot handler.
    pub(crate) fn emit(&self, event: &Event) {
        let kind = event.kind();
        let targets: Vec<Listener> = {
            let inner = self.inner.lock().expect("listener registry poisoned");
            inner
                .listeners
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, listener)| listener.clone())
                .chain(inner.slots.get(&kind).cloned())
                .collect()
        };
        for target in targets {
            target(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<Mutex<u32>>, Listener) {
        let count = Arc::new(Mutex::new(0));
        let count_in = count.clone();
        let listener: Listener = Arc::new(move |_| *count_in.lock().unwrap() += 1);
        (count, listener)
    }

    #[test]
    fn listeners_and_slot_both_fire() {
        let registry = Registry::default();
        let (list_count, listener) = counter();
        let (slot_count, slot) = counter();

        registry.add(EventKind::Open, listener);
        registry.set_slot(EventKind::Open, Some(slot));

        registry.emit(&Event::Open);
        assert_eq!(*list_count.lock().unwrap(), 1);
        assert_eq!(*slot_count.lock().unwrap(), 1);
    }

    #[test]
    fn only_matching_kind_fires() {
        let registry = Registry::default();
        let (count, listener) = counter();
        registry.add(EventKind::Down, listener);

        registry.emit(&Event::Open);
        registry.emit(&Event::Reopen);
        assert_eq!(*count.lock().unwrap(), 0);

        registry.emit(&Event::Down(None));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn removed_listener_stops_firing() {
        let registry = Registry::default();
        let (count, listener) = counter();
        let id = registry.add(EventKind::Message, listener);

        registry.emit(&Event::Message(Payload::Text("one".into())));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.emit(&Event::Message(Payload::Text("two".into())));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn slot_replacement_keeps_a_single_subscriber() {
        let registry = Registry::default();
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        registry.set_slot(EventKind::Reopen, Some(first));
        registry.set_slot(EventKind::Reopen, Some(second));
        registry.emit(&Event::Reopen);

        assert_eq!(*first_count.lock().unwrap(), 0);
        assert_eq!(*second_count.lock().unwrap(), 1);

        registry.set_slot(EventKind::Reopen, None);
        registry.emit(&Event::Reopen);
        assert_eq!(*second_count.lock().unwrap(), 1);
    }

    #[test]
    fn handler_may_mutate_registry_during_dispatch() {
        let registry = Arc::new(Registry::default());
        let fired = Arc::new(Mutex::new(false));

        let registry_in = registry.clone();
        let fired_in = fired.clone();
        registry.add(
            EventKind::Open,
            Arc::new(move |_| {
                // Re-entrant registration must not deadlock.
                registry_in.set_slot(EventKind::Open, None);
                *fired_in.lock().unwrap() = true;
            }),
        );

        registry.emit(&Event::Open);
        assert!(*fired.lock().unwrap());
    }
}
