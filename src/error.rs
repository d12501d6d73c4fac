//! Error types surfaced by the capture/replay pipeline.

use std::any::Any;

use recording_store::RecordingStoreError;
use thiserror::Error;

use crate::core::payload::BlobReadError;
use crate::platform::events::EventKind;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("nothing to save: no messages were captured")]
    EmptyRecording,
    #[error("a recording session is active")]
    RecordingActive,
    #[error("a playback session is active")]
    PlaybackActive,
    #[error("playback speed must be a finite value greater than zero, got {speed}")]
    InvalidSpeed { speed: f64 },
    #[error("seek position must be a number between 0 and 1, got {fraction}")]
    InvalidSeek { fraction: f64 },
    #[error(transparent)]
    PayloadRead(#[from] BlobReadError),
    #[error(transparent)]
    Storage(#[from] RecordingStoreError),
}

/// Failure to reach or use the underlying socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("transport is not open")]
    NotOpen,
    #[error("socket send failed: {message}")]
    Send { message: String },
}

impl TransportError {
    pub fn connect(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }
}

/// One listener or handler that failed while an event was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{target} for {kind:?} event failed: {message}")]
pub struct ListenerDeliveryError {
    pub kind: EventKind,
    pub target: ListenerTarget,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
    Listener(usize),
    Handler,
}

impl std::fmt::Display for ListenerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listener(index) => write!(f, "listener #{index}"),
            Self::Handler => f.write_str("handler"),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
