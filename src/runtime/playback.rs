//! Timed replay of a recording's inbound messages.
//!
//! The delivery loop is a chain of queue tasks. Each tick delivers every
//! message that is due, then re-arms itself for the next due time (capped so
//! pause, seek and speed changes are picked up promptly).
//!
//! Elapsed recording time is `(now - anchor) * speed`. The anchor is rebased
//! whenever the mapping would otherwise jump: on resume (by the paused
//! duration), on speed change, and on seek.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use recording_store::{RecordedMessage, Recording};

use crate::error::SessionError;
use crate::lock_unpoisoned;
use crate::platform::fake::FakeTransport;
use crate::platform::input::InputSurface;
use crate::platform::transport::Transport;
use crate::runtime::clock::{Clock, TaskId, TaskQueue};

/// Receives messages as they fall due.
pub trait PlaybackSink: Send + Sync {
    /// `transport` is the bound fake, or `None` for replay into live
    /// transports.
    fn deliver(&self, message: &RecordedMessage, transport: Option<&FakeTransport>);

    fn playback_finished(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTiming {
    pub max_wait_ms: u64,
    pub pause_poll_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackProgress {
    pub phase: PlaybackPhase,
    pub cursor: usize,
    pub message_count: usize,
    /// Relative time of the last emitted message.
    pub position_ms: u64,
    pub total_duration_ms: u64,
    pub speed: f64,
}

impl PlaybackProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return if self.message_count > 0 && self.cursor >= self.message_count {
                1.0
            } else {
                0.0
            };
        }
        self.position_ms as f64 / self.total_duration_ms as f64
    }
}

struct PlaybackState {
    recording: Option<Arc<Recording>>,
    transport: Option<Arc<FakeTransport>>,
    phase: PlaybackPhase,
    cursor: usize,
    speed: f64,
    anchor_ms: f64,
    paused_at_ms: Option<u64>,
    pending: Option<TaskId>,
    /// Bumped on every begin/stop so stale ticks become no-ops.
    generation: u64,
}

enum Step {
    Deliver(RecordedMessage, Option<Arc<FakeTransport>>),
    Finished,
    Idle,
}

pub struct PlaybackScheduler {
    this: Weak<PlaybackScheduler>,
    sink: Weak<dyn PlaybackSink>,
    queue: Arc<TaskQueue>,
    clock: Arc<dyn Clock>,
    input: Arc<dyn InputSurface>,
    timing: PlaybackTiming,
    state: Mutex<PlaybackState>,
}

impl fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("progress", &self.progress())
            .field("timing", &self.timing)
            .finish()
    }
}

impl PlaybackScheduler {
    pub fn new(
        sink: Weak<dyn PlaybackSink>,
        queue: Arc<TaskQueue>,
        input: Arc<dyn InputSurface>,
        timing: PlaybackTiming,
    ) -> Arc<Self> {
        let clock = queue.clock();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            sink,
            queue,
            clock,
            input,
            timing,
            state: Mutex::new(PlaybackState {
                recording: None,
                transport: None,
                phase: PlaybackPhase::Stopped,
                cursor: 0,
                speed: 1.0,
                anchor_ms: 0.0,
                paused_at_ms: None,
                pending: None,
                generation: 0,
            }),
        })
    }

    pub fn phase(&self) -> PlaybackPhase {
        lock_unpoisoned(&self.state).phase
    }

    pub fn is_active(&self) -> bool {
        self.phase() != PlaybackPhase::Stopped
    }

    pub fn speed(&self) -> f64 {
        lock_unpoisoned(&self.state).speed
    }

    pub fn progress(&self) -> PlaybackProgress {
        let state = lock_unpoisoned(&self.state);
        let (message_count, total_duration_ms, position_ms) = match &state.recording {
            Some(recording) => {
                let position = state
                    .cursor
                    .checked_sub(1)
                    .and_then(|index| recording.messages.get(index))
                    .map_or(0, |message| message.relative_time_ms);
                (
                    recording.messages.len(),
                    recording.total_duration_ms,
                    position,
                )
            }
            None => (0, 0, 0),
        };

        PlaybackProgress {
            phase: state.phase,
            cursor: state.cursor,
            message_count,
            position_ms,
            total_duration_ms,
            speed: state.speed,
        }
    }

    /// Starts playing `recording` from the beginning and blocks user input.
    pub fn begin(
        &self,
        recording: Arc<Recording>,
        transport: Option<Arc<FakeTransport>>,
    ) -> Result<(), SessionError> {
        {
            let mut state = lock_unpoisoned(&self.state);
            if state.phase != PlaybackPhase::Stopped {
                return Err(SessionError::PlaybackActive);
            }

            tracing::info!(
                name = %recording.name,
                messages = recording.messages.len(),
                duration_ms = recording.total_duration_ms,
                speed = state.speed,
                bound = transport.is_some(),
                "playback started"
            );
            state.recording = Some(recording);
            state.transport = transport;
            state.phase = PlaybackPhase::Playing;
            state.cursor = 0;
            state.anchor_ms = self.clock.now_ms() as f64;
            state.paused_at_ms = None;
            state.generation += 1;
            self.arm(&mut state, 0);
        }

        self.input.set_user_input_blocked(true);
        Ok(())
    }

    pub fn pause(&self) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        if state.phase != PlaybackPhase::Playing {
            return false;
        }

        state.phase = PlaybackPhase::Paused;
        state.paused_at_ms = Some(self.clock.now_ms());
        tracing::debug!(cursor = state.cursor, "playback paused");
        true
    }

    pub fn resume(&self) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        if state.phase != PlaybackPhase::Paused {
            return false;
        }

        let now = self.clock.now_ms();
        if let Some(paused_at) = state.paused_at_ms.take() {
            state.anchor_ms += now.saturating_sub(paused_at) as f64;
        }
        state.phase = PlaybackPhase::Playing;
        self.rearm_now(&mut state);
        tracing::debug!(cursor = state.cursor, "playback resumed");
        true
    }

    /// Returns the phase after toggling; a stopped scheduler stays stopped.
    pub fn toggle_pause(&self) -> PlaybackPhase {
        match self.phase() {
            PlaybackPhase::Playing => {
                self.pause();
            }
            PlaybackPhase::Paused => {
                self.resume();
            }
            PlaybackPhase::Stopped => {}
        }
        self.phase()
    }

    /// Changes the rate while keeping the current elapsed position.
    pub fn set_speed(&self, speed: f64) -> Result<(), SessionError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SessionError::InvalidSpeed { speed });
        }

        let mut state = lock_unpoisoned(&self.state);
        if state.phase == PlaybackPhase::Stopped {
            state.speed = speed;
            return Ok(());
        }

        let now = self.clock.now_ms();
        let elapsed = Self::elapsed_at(&state, now);
        state.speed = speed;
        Self::rebase(&mut state, now, elapsed);
        if state.phase == PlaybackPhase::Playing {
            self.rearm_now(&mut state);
        }
        tracing::debug!(speed, "playback speed changed");
        Ok(())
    }

    /// Jumps to `fraction` (clamped to 0..=1) of the total duration.
    pub fn seek(&self, fraction: f64) -> Result<(), SessionError> {
        if fraction.is_nan() {
            return Err(SessionError::InvalidSeek { fraction });
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let mut state = lock_unpoisoned(&self.state);
        if state.phase == PlaybackPhase::Stopped {
            return Ok(());
        }
        let Some(recording) = state.recording.clone() else {
            return Ok(());
        };

        let target = fraction * recording.total_duration_ms as f64;
        state.cursor = recording
            .messages
            .iter()
            .position(|message| message.relative_time_ms as f64 >= target)
            .unwrap_or(0);
        Self::rebase(&mut state, self.clock.now_ms(), target);
        if state.phase == PlaybackPhase::Playing {
            self.rearm_now(&mut state);
        }
        tracing::debug!(fraction, cursor = state.cursor, "playback seek");
        Ok(())
    }

    /// Ends playback from any state: cancels the pending tick, unblocks
    /// input, closes the bound fake and notifies the sink. No-op when
    /// already stopped.
    pub fn stop(&self) {
        let transport = {
            let mut state = lock_unpoisoned(&self.state);
            if state.phase == PlaybackPhase::Stopped {
                return;
            }

            if let Some(task) = state.pending.take() {
                self.queue.cancel(task);
            }
            state.phase = PlaybackPhase::Stopped;
            state.paused_at_ms = None;
            state.generation += 1;
            tracing::info!(cursor = state.cursor, "playback stopped");
            state.transport.take()
        };

        self.input.set_user_input_blocked(false);
        if let Some(transport) = transport {
            transport.close(None, None);
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.playback_finished();
        }
    }

    fn elapsed_at(state: &PlaybackState, now: u64) -> f64 {
        let now = state.paused_at_ms.unwrap_or(now);
        ((now as f64 - state.anchor_ms) * state.speed).max(0.0)
    }

    fn rebase(state: &mut PlaybackState, now: u64, elapsed: f64) {
        let reference = state.paused_at_ms.unwrap_or(now);
        state.anchor_ms = reference as f64 - elapsed / state.speed;
    }

    fn rearm_now(&self, state: &mut PlaybackState) {
        if let Some(task) = state.pending.take() {
            self.queue.cancel(task);
        }
        self.arm(state, 0);
    }

    fn arm(&self, state: &mut PlaybackState, delay_ms: u64) {
        let scheduler = self.this.clone();
        let generation = state.generation;
        state.pending = Some(self.queue.schedule(delay_ms, move || {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.tick(generation);
            }
        }));
    }

    fn tick(&self, generation: u64) {
        loop {
            let step = {
                let mut state = lock_unpoisoned(&self.state);
                self.next_step(&mut state, generation)
            };

            match step {
                Step::Deliver(message, transport) => {
                    if let Some(sink) = self.sink.upgrade() {
                        sink.deliver(&message, transport.as_deref());
                    }
                }
                Step::Finished => {
                    tracing::debug!("playback reached end of recording");
                    self.stop();
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn next_step(&self, state: &mut PlaybackState, generation: u64) -> Step {
        if state.generation != generation || state.phase == PlaybackPhase::Stopped {
            return Step::Idle;
        }
        if let Some(task) = state.pending.take() {
            self.queue.cancel(task);
        }
        if state.phase == PlaybackPhase::Paused {
            self.arm(state, self.timing.pause_poll_ms);
            return Step::Idle;
        }
        let Some(recording) = state.recording.clone() else {
            return Step::Finished;
        };

        let elapsed = Self::elapsed_at(state, self.clock.now_ms());
        while let Some(message) = recording.messages.get(state.cursor) {
            let due = message.relative_time_ms as f64;
            if due > elapsed {
                let wait = ((due - elapsed) / state.speed).ceil() as u64;
                self.arm(state, wait.clamp(1, self.timing.max_wait_ms.max(1)));
                return Step::Idle;
            }

            state.cursor += 1;
            if message.direction.is_inbound() {
                return Step::Deliver(message.clone(), state.transport.clone());
            }
        }

        Step::Finished
    }
}
