//! Transparent capture, redaction, storage and timed replay of
//! bidirectional message transports.
//!
//! # Pipeline
//! - Live transports built by [`SessionController::open_transport`] pass every
//!   send and receive through a capture hook into the [`Recorder`].
//! - Saving finalizes the buffer: text payloads are redacted, binary payloads
//!   are materialized, times become relative to the first message.
//! - While replay is engaged, new connections get a [`FakeTransport`] that
//!   opens after a simulated handshake and is fed by the
//!   [`PlaybackScheduler`] at the original pace, scaled by speed.
//!
//! Time is abstracted behind [`Clock`] and [`TaskQueue`], so the whole
//! pipeline runs deterministically under a [`ManualClock`].

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod runtime;

use std::sync::{Mutex, MutexGuard};

pub use recording_store;

pub use crate::config::RecorderConfig;
pub use crate::core::codec::{
    classify, deserialize, redact, serialize, DecodeError, PayloadInfo, PayloadKind,
    REDACTION_RULES,
};
pub use crate::core::payload::{Blob, BlobReadError, BlobSource, ByteView, WirePayload};
pub use crate::core::recorder::{
    should_auto_start, CaptureOutcome, CaptureSnapshot, CaptureSummary, FinalizedRecording,
    Recorder, RecorderState,
};
pub use crate::core::semantic::extract_angle;
pub use crate::error::{ListenerDeliveryError, ListenerTarget, SessionError, TransportError};
pub use crate::platform::{
    pointer_for_angle, CaptureHook, Connector, DeliveryReport, EventHub, EventKind,
    FakeTransport, HeadlessInput, InputSurface, InterceptedTransport, Listener, ListenerId,
    MemoryConnector, MemoryPeer, PointerPosition, RawSocket, ReadyState, RecordingInputSurface,
    SocketEvents, Transport, TransportEvent, Viewport,
};
pub use crate::runtime::{
    Clock, ManualClock, PlaybackPhase, PlaybackProgress, PlaybackScheduler, PlaybackSink,
    SaveOutcome, SessionController, SessionHost, SystemClock, TaskQueue,
};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
