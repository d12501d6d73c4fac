//! The transport interface shared by live and fake connections.

use crate::core::payload::WirePayload;
use crate::error::TransportError;
use crate::platform::events::{EventHub, EventKind, Listener, ListenerId, ReadyState};

/// A bidirectional, event-based message channel.
///
/// Application code sees the same shape whether it talks to a live socket or
/// to a replay-backed fake.
pub trait Transport: Send + Sync {
    fn url(&self) -> &str;

    fn ready_state(&self) -> ReadyState;

    fn send(&self, payload: WirePayload) -> Result<(), TransportError>;

    /// Starts closing; a close event follows once the channel is closed.
    fn close(&self, code: Option<u16>, reason: Option<&str>);

    fn events(&self) -> &EventHub;

    fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.events().add_listener(kind, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.events().remove_listener(id)
    }

    fn set_handler(&self, kind: EventKind, handler: Option<Listener>) {
        self.events().set_handler(kind, handler);
    }
}
