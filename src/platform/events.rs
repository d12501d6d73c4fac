//! Transport event model and listener dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::core::payload::WirePayload;
use crate::error::{panic_message, ListenerDeliveryError, ListenerTarget};
use crate::lock_unpoisoned;

/// Close code reported for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Error,
    Close,
}

impl EventKind {
    const ALL: [EventKind; 4] = [Self::Open, Self::Message, Self::Error, Self::Close];

    fn slot(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Message => 1,
            Self::Error => 2,
            Self::Close => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message {
        payload: WirePayload,
    },
    Error {
        message: String,
    },
    Close {
        code: u16,
        reason: String,
        was_clean: bool,
    },
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Message { .. } => EventKind::Message,
            Self::Error { .. } => EventKind::Error,
            Self::Close { .. } => EventKind::Close,
        }
    }

    pub fn payload(&self) -> Option<&WirePayload> {
        match self {
            Self::Message { payload } => Some(payload),
            _ => None,
        }
    }
}

pub type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of dispatching one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<ListenerDeliveryError>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    handlers: [Option<Listener>; 4],
}

/// Per-transport listener registry: any number of listeners per event kind
/// plus one replaceable handler slot per kind.
#[derive(Default)]
pub struct EventHub {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock_unpoisoned(&self.registry);
        let handlers: Vec<EventKind> = EventKind::ALL
            .into_iter()
            .filter(|kind| registry.handlers[kind.slot()].is_some())
            .collect();
        f.debug_struct("EventHub")
            .field("listeners", &registry.listeners.len())
            .field("handlers", &handlers)
            .finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let mut registry = lock_unpoisoned(&self.registry);
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.push((id, kind, listener));
        id
    }

    /// Convenience wrapper around [`EventHub::add_listener`] for closures.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&TransportEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.add_listener(kind, Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = lock_unpoisoned(&self.registry);
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _, _)| *existing != id);
        registry.listeners.len() != before
    }

    /// Replaces the single handler slot for `kind`; `None` clears it.
    pub fn set_handler(&self, kind: EventKind, handler: Option<Listener>) {
        lock_unpoisoned(&self.registry).handlers[kind.slot()] = handler;
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        lock_unpoisoned(&self.registry).handlers[kind.slot()].is_some()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock_unpoisoned(&self.registry)
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == kind)
            .count()
    }

    /// Calls every listener of the event's kind in registration order, then
    /// the handler slot. A panicking callee is recorded and skipped.
    ///
    /// Callees run without the registry lock held, so they may register or
    /// remove listeners; such changes apply from the next event on.
    pub fn emit(&self, event: &TransportEvent) -> DeliveryReport {
        let kind = event.kind();
        let targets: Vec<(ListenerTarget, Listener)> = {
            let registry = lock_unpoisoned(&self.registry);
            registry
                .listeners
                .iter()
                .filter(|(_, registered, _)| *registered == kind)
                .enumerate()
                .map(|(index, (_, _, listener))| {
                    (ListenerTarget::Listener(index), Arc::clone(listener))
                })
                .chain(
                    registry.handlers[kind.slot()]
                        .as_ref()
                        .map(|handler| (ListenerTarget::Handler, Arc::clone(handler))),
                )
                .collect()
        };

        let mut report = DeliveryReport::default();
        for (target, listener) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    let failure = ListenerDeliveryError {
                        kind,
                        target,
                        message: panic_message(panic.as_ref()),
                    };
                    tracing::warn!(error = %failure, "transport listener failed");
                    report.failures.push(failure);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |event: &TransportEvent| {
            log.lock()
                .expect("log lock")
                .push(format!("{label}:{:?}", event.kind()));
        })
    }

    #[test]
    fn listeners_run_in_order_before_handler() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.set_handler(EventKind::Message, Some(recorder(&log, "handler")));
        hub.add_listener(EventKind::Message, recorder(&log, "first"));
        hub.add_listener(EventKind::Close, recorder(&log, "close"));
        hub.add_listener(EventKind::Message, recorder(&log, "second"));

        let report = hub.emit(&TransportEvent::Message {
            payload: WirePayload::text("hi"),
        });

        assert_eq!(report.delivered, 3);
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["first:Message", "second:Message", "handler:Message"]
        );
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let hub = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        hub.on(EventKind::Open, |_| panic!("listener exploded"));
        let counter = Arc::clone(&calls);
        hub.on(EventKind::Open, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = hub.emit(&TransportEvent::Open);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, ListenerTarget::Listener(0));
        assert_eq!(report.failures[0].message, "listener exploded");
    }

    #[test]
    fn removed_listener_and_cleared_handler_stop_receiving() {
        let hub = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = hub.on(EventKind::Error, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hub.set_handler(EventKind::Error, Some(Arc::new(|_: &TransportEvent| {})));

        assert!(hub.remove_listener(id));
        assert!(!hub.remove_listener(id));
        hub.set_handler(EventKind::Error, None);

        let report = hub.emit(&TransportEvent::Error {
            message: "boom".to_string(),
        });
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_register_during_emit() {
        let hub = Arc::new(EventHub::new());
        let inner = Arc::clone(&hub);
        hub.on(EventKind::Open, move |_| {
            inner.on(EventKind::Open, |_| {});
        });

        assert_eq!(hub.emit(&TransportEvent::Open).delivered, 1);
        assert_eq!(hub.listener_count(EventKind::Open), 2);
    }
}
