//! Live transports whose traffic passes through a capture hook.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use recording_store::Direction;

use crate::core::payload::WirePayload;
use crate::error::{panic_message, TransportError};
use crate::lock_unpoisoned;
use crate::platform::events::{EventHub, ReadyState, TransportEvent};
use crate::platform::transport::Transport;

/// Observer of every message crossing a live transport.
///
/// Calls happen synchronously on the send/receive path. A panicking hook is
/// caught and logged; the message is still delivered.
pub trait CaptureHook: Send + Sync {
    fn on_send(&self, url: &str, payload: &WirePayload);
    fn on_receive(&self, url: &str, payload: &WirePayload);
}

/// Outgoing half of an underlying socket.
pub trait RawSocket: Send + Sync {
    fn send(&self, payload: WirePayload) -> Result<(), TransportError>;
    fn close(&self, code: Option<u16>, reason: Option<&str>);
}

/// Opens underlying sockets. The socket reports inbound activity through the
/// supplied [`SocketEvents`].
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str, events: SocketEvents) -> Result<Box<dyn RawSocket>, TransportError>;
}

/// Callback handle a socket uses to report inbound activity. Events reported
/// after the transport is dropped are ignored.
#[derive(Clone)]
pub struct SocketEvents {
    transport: Weak<InterceptedTransport>,
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("attached", &(self.transport.strong_count() > 0))
            .finish()
    }
}

impl SocketEvents {
    pub fn opened(&self) {
        if let Some(transport) = self.transport.upgrade() {
            transport.set_state(ReadyState::Open);
            transport.hub.emit(&TransportEvent::Open);
        }
    }

    /// Captures the payload once, then dispatches it to the application.
    pub fn message(&self, payload: WirePayload) {
        if let Some(transport) = self.transport.upgrade() {
            transport.notify_hook(Direction::Inbound, &payload);
            transport.hub.emit(&TransportEvent::Message { payload });
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        if let Some(transport) = self.transport.upgrade() {
            transport.hub.emit(&TransportEvent::Error {
                message: message.into(),
            });
        }
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>, was_clean: bool) {
        if let Some(transport) = self.transport.upgrade() {
            if transport.set_state(ReadyState::Closed) == ReadyState::Closed {
                return;
            }
            transport.hub.emit(&TransportEvent::Close {
                code,
                reason: reason.into(),
                was_clean,
            });
        }
    }
}

pub struct InterceptedTransport {
    url: String,
    state: Mutex<ReadyState>,
    socket: Mutex<Option<Arc<dyn RawSocket>>>,
    hook: Weak<dyn CaptureHook>,
    hub: EventHub,
}

impl fmt::Debug for InterceptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedTransport")
            .field("url", &self.url)
            .field("state", &self.ready_state())
            .field("hub", &self.hub)
            .finish()
    }
}

impl InterceptedTransport {
    pub fn connect(
        url: &str,
        connector: &dyn Connector,
        hook: Weak<dyn CaptureHook>,
    ) -> Result<Arc<Self>, TransportError> {
        let transport = Arc::new(Self {
            url: url.to_string(),
            state: Mutex::new(ReadyState::Connecting),
            socket: Mutex::new(None),
            hook,
            hub: EventHub::new(),
        });

        let socket = connector.connect(
            url,
            SocketEvents {
                transport: Arc::downgrade(&transport),
            },
        )?;
        *lock_unpoisoned(&transport.socket) = Some(Arc::from(socket));
        tracing::debug!(url, "live transport constructed");
        Ok(transport)
    }

    fn set_state(&self, next: ReadyState) -> ReadyState {
        std::mem::replace(&mut *lock_unpoisoned(&self.state), next)
    }

    fn notify_hook(&self, direction: Direction, payload: &WirePayload) {
        let Some(hook) = self.hook.upgrade() else {
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| match direction {
            Direction::Outbound => hook.on_send(&self.url, payload),
            Direction::Inbound => hook.on_receive(&self.url, payload),
        }));
        if let Err(panic) = result {
            tracing::warn!(
                url = %self.url,
                direction = direction.as_str(),
                error = %panic_message(panic.as_ref()),
                "capture hook failed; message delivered uncaptured"
            );
        }
    }
}

impl Transport for InterceptedTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn ready_state(&self) -> ReadyState {
        *lock_unpoisoned(&self.state)
    }

    fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        let Some(socket) = lock_unpoisoned(&self.socket).clone() else {
            return Err(TransportError::NotOpen);
        };

        self.notify_hook(Direction::Outbound, &payload);
        socket.send(payload)
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        {
            let mut state = lock_unpoisoned(&self.state);
            if matches!(*state, ReadyState::Closing | ReadyState::Closed) {
                return;
            }
            *state = ReadyState::Closing;
        }

        let socket = lock_unpoisoned(&self.socket).clone();
        if let Some(socket) = socket {
            socket.close(code, reason);
        }
    }

    fn events(&self) -> &EventHub {
        &self.hub
    }
}
