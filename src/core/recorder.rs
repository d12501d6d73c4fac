//! Capture-side recording: an ordered, timestamped buffer of live messages
//! and its finalization into a [`Recording`].

use recording_store::{Direction, RecordedMessage, Recording};

use crate::core::codec;
use crate::core::payload::WirePayload;
use crate::error::SessionError;

/// Text frames that never trigger auto-start (compared case-insensitively).
pub const RESERVED_CONTROL_TOKENS: [&str; 4] = ["ping", "pong", "2", "3"];

/// Minimum character length of a text frame that triggers auto-start.
pub const AUTO_START_MIN_TEXT_LEN: usize = 5;

/// Name used when a recording is saved without one.
pub const DEFAULT_RECORDING_NAME: &str = "unnamed";

/// Returns true when `payload` looks like session traffic rather than a
/// keepalive frame.
pub fn should_auto_start(payload: &WirePayload) -> bool {
    match payload {
        WirePayload::Text(text) => {
            let reserved = RESERVED_CONTROL_TOKENS
                .iter()
                .any(|token| text.eq_ignore_ascii_case(token));
            !reserved && text.chars().count() >= AUTO_START_MIN_TEXT_LEN
        }
        WirePayload::Buffer(_) | WirePayload::View(_) | WirePayload::Blob(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// One observed wire event.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub direction: Direction,
    pub payload: WirePayload,
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not recording; nothing was buffered.
    Ignored,
    Captured,
    /// Captured, and this message pushed the session past the large-recording
    /// threshold for the first time.
    CapturedLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub inbound: usize,
    pub outbound: usize,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub struct Recorder {
    state: RecorderState,
    messages: Vec<RawMessage>,
    started_at_ms: Option<u64>,
    large: bool,
    large_threshold_ms: u64,
    session: u64,
}

impl Recorder {
    #[must_use]
    pub fn new(large_threshold_ms: u64) -> Self {
        Self {
            state: RecorderState::Idle,
            messages: Vec::new(),
            started_at_ms: None,
            large: false,
            large_threshold_ms,
            session: 0,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    /// True once the current buffer has spanned the large-recording threshold.
    pub fn is_large(&self) -> bool {
        self.large
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Begins a new session, discarding any previous buffer. Returns false
    /// when a session is already running.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.is_recording() {
            return false;
        }

        self.state = RecorderState::Recording;
        self.messages.clear();
        self.large = false;
        self.started_at_ms = Some(now_ms);
        self.session += 1;
        true
    }

    /// Ends the session; the buffer is kept for finalization.
    pub fn stop(&mut self) -> Option<CaptureSummary> {
        if !self.is_recording() {
            return None;
        }

        self.state = RecorderState::Idle;
        self.summary()
    }

    pub fn capture(
        &mut self,
        direction: Direction,
        payload: WirePayload,
        now_ms: u64,
    ) -> CaptureOutcome {
        if !self.is_recording() {
            return CaptureOutcome::Ignored;
        }

        self.messages.push(RawMessage {
            direction,
            payload,
            observed_at_ms: now_ms,
        });

        if !self.large && self.elapsed_ms() >= self.large_threshold_ms {
            self.large = true;
            return CaptureOutcome::CapturedLarge;
        }

        CaptureOutcome::Captured
    }

    /// Span between the first and last buffered message.
    pub fn elapsed_ms(&self) -> u64 {
        match (self.messages.first(), self.messages.last()) {
            (Some(first), Some(last)) => last.observed_at_ms.saturating_sub(first.observed_at_ms),
            _ => 0,
        }
    }

    pub fn summary(&self) -> Option<CaptureSummary> {
        if self.messages.is_empty() {
            return None;
        }

        let inbound = self
            .messages
            .iter()
            .filter(|message| message.direction.is_inbound())
            .count();
        Some(CaptureSummary {
            inbound,
            outbound: self.messages.len() - inbound,
            duration_ms: self.elapsed_ms(),
        })
    }

    /// Copies the buffer so it can be finalized without holding the recorder.
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            session: self.session,
            messages: self.messages.clone(),
            large: self.large,
            large_threshold_ms: self.large_threshold_ms,
        }
    }

    pub async fn finalize(&self, name: &str) -> Result<FinalizedRecording, SessionError> {
        self.snapshot().finalize(name).await
    }

    /// Drops the buffer of `session` after it was saved. Returns false when a
    /// newer session has started or the session is still running.
    pub fn clear_saved(&mut self, session: u64) -> bool {
        if session != self.session || self.is_recording() {
            return false;
        }

        self.messages.clear();
        self.large = false;
        true
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    session: u64,
    messages: Vec<RawMessage>,
    large: bool,
    large_threshold_ms: u64,
}

impl CaptureSnapshot {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Serializes every message (redacting text) with times relative to the
    /// first one.
    pub async fn finalize(self, name: &str) -> Result<FinalizedRecording, SessionError> {
        let Some(base_ms) = self.messages.first().map(|first| first.observed_at_ms) else {
            return Err(SessionError::EmptyRecording);
        };

        let mut messages = Vec::with_capacity(self.messages.len());
        for raw in &self.messages {
            messages.push(RecordedMessage {
                direction: raw.direction,
                data: codec::serialize(&raw.payload).await?,
                relative_time_ms: raw.observed_at_ms.saturating_sub(base_ms),
            });
        }

        let name = match name.trim() {
            "" => DEFAULT_RECORDING_NAME,
            trimmed => trimmed,
        };
        let recording = Recording::new(name, messages);
        let large = self.large || recording.total_duration_ms >= self.large_threshold_ms;

        Ok(FinalizedRecording {
            inbound: recording.inbound_count(),
            outbound: recording.outbound_count(),
            recording,
            large,
            session: self.session,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FinalizedRecording {
    pub recording: Recording,
    pub inbound: usize,
    pub outbound: usize,
    /// Must be exported to a file instead of the persistent store.
    pub large: bool,
    pub session: u64,
}
