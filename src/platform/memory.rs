//! In-process loopback sockets for tests and headless hosts.

use std::sync::{Arc, Mutex};

use crate::core::payload::WirePayload;
use crate::error::TransportError;
use crate::lock_unpoisoned;
use crate::platform::events::NORMAL_CLOSURE;
use crate::platform::interceptor::{Connector, RawSocket, SocketEvents};

/// Remote end of a loopback socket. Records what the client sent and lets
/// the caller drive inbound activity.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    events: SocketEvents,
    sent: Mutex<Vec<WirePayload>>,
    close_request: Mutex<Option<(Option<u16>, Option<String>)>>,
}

impl MemoryPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn open(&self) {
        self.events.opened();
    }

    pub fn push(&self, payload: impl Into<WirePayload>) {
        self.events.message(payload.into());
    }

    pub fn fail(&self, message: &str) {
        self.events.error(message);
    }

    /// Closes from the remote side.
    pub fn hang_up(&self, code: u16, reason: &str) {
        self.events.closed(code, reason, true);
    }

    pub fn sent(&self) -> Vec<WirePayload> {
        lock_unpoisoned(&self.sent).clone()
    }

    pub fn close_request(&self) -> Option<(Option<u16>, Option<String>)> {
        lock_unpoisoned(&self.close_request).clone()
    }
}

struct MemorySocket {
    peer: Arc<MemoryPeer>,
}

impl RawSocket for MemorySocket {
    fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
        lock_unpoisoned(&self.peer.sent).push(payload);
        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        *lock_unpoisoned(&self.peer.close_request) = Some((code, reason.map(str::to_string)));
        self.peer.events.closed(
            code.unwrap_or(NORMAL_CLOSURE),
            reason.unwrap_or_default(),
            true,
        );
    }
}

#[derive(Debug, Default)]
pub struct MemoryConnector {
    peers: Mutex<Vec<Arc<MemoryPeer>>>,
    refusal: Option<String>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every connection attempt fails with `message`.
    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            refusal: Some(message.into()),
        }
    }

    pub fn peers(&self) -> Vec<Arc<MemoryPeer>> {
        lock_unpoisoned(&self.peers).clone()
    }

    pub fn last_peer(&self) -> Option<Arc<MemoryPeer>> {
        lock_unpoisoned(&self.peers).last().cloned()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str, events: SocketEvents) -> Result<Box<dyn RawSocket>, TransportError> {
        if let Some(message) = &self.refusal {
            return Err(TransportError::connect(url, message.clone()));
        }

        let peer = Arc::new(MemoryPeer {
            url: url.to_string(),
            events,
            sent: Mutex::new(Vec::new()),
            close_request: Mutex::new(None),
        });
        lock_unpoisoned(&self.peers).push(Arc::clone(&peer));
        Ok(Box::new(MemorySocket { peer }))
    }
}
