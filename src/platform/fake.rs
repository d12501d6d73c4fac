//! Replay-backed stand-in for a live transport.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::core::payload::WirePayload;
use crate::error::TransportError;
use crate::lock_unpoisoned;
use crate::platform::events::{
    DeliveryReport, EventHub, ReadyState, TransportEvent, NORMAL_CLOSURE,
};
use crate::platform::transport::Transport;
use crate::runtime::clock::{TaskId, TaskQueue};

/// Invoked once the simulated handshake completes.
pub type OpenCallback = Box<dyn FnOnce(Arc<FakeTransport>) + Send>;

struct FakeState {
    ready: ReadyState,
    handshake: Option<TaskId>,
}

pub struct FakeTransport {
    url: String,
    queue: Arc<TaskQueue>,
    state: Mutex<FakeState>,
    hub: EventHub,
}

impl fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTransport")
            .field("url", &self.url)
            .field("state", &self.ready_state())
            .field("hub", &self.hub)
            .finish()
    }
}

impl FakeTransport {
    /// Creates a connecting fake that opens after `handshake_delay_ms` of
    /// queue time, emits `Open`, then runs `on_open`.
    pub fn connect(
        url: &str,
        queue: &Arc<TaskQueue>,
        handshake_delay_ms: u64,
        on_open: OpenCallback,
    ) -> Arc<Self> {
        let transport = Arc::new(Self {
            url: url.to_string(),
            queue: Arc::clone(queue),
            state: Mutex::new(FakeState {
                ready: ReadyState::Connecting,
                handshake: None,
            }),
            hub: EventHub::new(),
        });

        let weak: Weak<Self> = Arc::downgrade(&transport);
        let task = queue.schedule(handshake_delay_ms, move || {
            if let Some(transport) = weak.upgrade() {
                transport.complete_handshake(on_open);
            }
        });
        lock_unpoisoned(&transport.state).handshake = Some(task);
        tracing::debug!(url, handshake_delay_ms, "fake transport constructed");
        transport
    }

    fn complete_handshake(self: Arc<Self>, on_open: OpenCallback) {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.handshake = None;
            if state.ready != ReadyState::Connecting {
                return;
            }
            state.ready = ReadyState::Open;
        }

        tracing::debug!(url = %self.url, "fake transport open");
        self.hub.emit(&TransportEvent::Open);
        on_open(self);
    }

    /// Dispatches a message notification to every listener and the handler.
    pub fn deliver_message(&self, payload: WirePayload) -> DeliveryReport {
        self.hub.emit(&TransportEvent::Message { payload })
    }
}

impl Transport for FakeTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn ready_state(&self) -> ReadyState {
        lock_unpoisoned(&self.state).ready
    }

    /// Accepted and discarded.
    fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
        tracing::debug!(url = %self.url, binary = payload.is_binary(), "fake transport discarded send");
        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let handshake = {
            let mut state = lock_unpoisoned(&self.state);
            if state.ready == ReadyState::Closed {
                return;
            }
            state.ready = ReadyState::Closed;
            state.handshake.take()
        };
        if let Some(task) = handshake {
            self.queue.cancel(task);
        }

        self.hub.emit(&TransportEvent::Close {
            code: code.unwrap_or(NORMAL_CLOSURE),
            reason: reason.unwrap_or_default().to_string(),
            was_clean: true,
        });
    }

    fn events(&self) -> &EventHub {
        &self.hub
    }
}
