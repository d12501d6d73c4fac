#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use wire_tape::recording_store::{
    Direction, MemoryRecordingStore, RecordedMessage, RecordedPayload, Recording, RecordingStore,
};
use wire_tape::{
    Clock, EventKind, ManualClock, MemoryConnector, MemoryPeer, RecorderConfig,
    RecordingInputSurface, SessionController, SessionHost, TaskQueue, Transport, TransportEvent,
    Viewport, WirePayload,
};

pub const VIEWPORT: Viewport = Viewport {
    width: 800.0,
    height: 600.0,
};

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub queue: Arc<TaskQueue>,
    pub connector: Arc<MemoryConnector>,
    pub input: Arc<RecordingInputSurface>,
    pub store: Arc<MemoryRecordingStore>,
    pub controller: Arc<SessionController>,
    pub export_dir: TempDir,
}

pub fn harness() -> Harness {
    build(MemoryRecordingStore::new(), |_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut RecorderConfig)) -> Harness {
    build(MemoryRecordingStore::new(), configure)
}

pub fn harness_with_store(store: MemoryRecordingStore) -> Harness {
    build(store, |_| {})
}

fn build(store: MemoryRecordingStore, configure: impl FnOnce(&mut RecorderConfig)) -> Harness {
    let export_dir = tempfile::tempdir().expect("export dir should be created");
    let mut config = RecorderConfig {
        export_dir: export_dir.path().to_path_buf(),
        ..RecorderConfig::default()
    };
    configure(&mut config);

    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(TaskQueue::new(clock.clone()));
    let connector = Arc::new(MemoryConnector::new());
    let input = Arc::new(RecordingInputSurface::new(Some(VIEWPORT)));
    let store = Arc::new(store);
    let store_handle: Arc<dyn RecordingStore> = store.clone();
    let controller = SessionController::new(
        config,
        SessionHost {
            queue: Arc::clone(&queue),
            connector: connector.clone(),
            input: input.clone(),
            store: store_handle,
        },
    );

    Harness {
        clock,
        queue,
        connector,
        input,
        store,
        controller,
        export_dir,
    }
}

impl Harness {
    /// Opens a live transport and completes its handshake.
    pub fn open_live(&self, url: &str) -> (Arc<dyn Transport>, Arc<MemoryPeer>) {
        let transport = self
            .controller
            .open_transport(url)
            .expect("live transport should open");
        let peer = self.connector.last_peer().expect("connector should have a peer");
        peer.open();
        (transport, peer)
    }

    pub fn advance(&self, delta_ms: u64) {
        self.clock.run_for(&self.queue, delta_ms);
    }
}

/// Collects `(now_ms, payload)` for every message event on `transport`.
pub fn message_log(
    transport: &dyn Transport,
    clock: &Arc<ManualClock>,
) -> Arc<Mutex<Vec<(u64, WirePayload)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let clock = Arc::clone(clock);
    transport.events().on(EventKind::Message, move |event| {
        if let Some(payload) = event.payload() {
            sink.lock()
                .expect("message log lock")
                .push((clock.now_ms(), payload.clone()));
        }
    });
    log
}

pub fn close_log(transport: &dyn Transport) -> Arc<Mutex<Vec<TransportEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    transport.events().on(EventKind::Close, move |event| {
        sink.lock().expect("close log lock").push(event.clone());
    });
    log
}

pub fn text_message(direction: Direction, at: u64, text: &str) -> RecordedMessage {
    RecordedMessage {
        direction,
        data: RecordedPayload::text(text),
        relative_time_ms: at,
    }
}

pub fn bytes_message(direction: Direction, at: u64, bytes: &[u8]) -> RecordedMessage {
    RecordedMessage {
        direction,
        data: RecordedPayload::bytes(bytes),
        relative_time_ms: at,
    }
}

pub fn recording(name: &str, messages: Vec<RecordedMessage>) -> Recording {
    Recording::new(name, messages)
}
