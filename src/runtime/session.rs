//! The session controller: owns the recorder, replay mode, the registry of
//! live transports and the playback scheduler, and decides whether a new
//! connection is live or replayed.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use recording_store::{
    export_recording, recording_key, unix_time_ms, Direction, RecordedMessage, Recording,
    RecordingStore,
};

use crate::config::RecorderConfig;
use crate::core::codec;
use crate::core::payload::WirePayload;
use crate::core::recorder::{
    should_auto_start, CaptureOutcome, CaptureSnapshot, CaptureSummary, Recorder,
};
use crate::core::semantic::extract_angle;
use crate::error::{SessionError, TransportError};
use crate::lock_unpoisoned;
use crate::platform::events::{DeliveryReport, ReadyState, TransportEvent};
use crate::platform::fake::FakeTransport;
use crate::platform::input::{pointer_for_angle, InputSurface};
use crate::platform::interceptor::{CaptureHook, Connector, InterceptedTransport};
use crate::platform::transport::Transport;
use crate::runtime::clock::{Clock, TaskQueue};
use crate::runtime::playback::{
    PlaybackPhase, PlaybackProgress, PlaybackScheduler, PlaybackSink, PlaybackTiming,
};

/// Host collaborators a controller is built from.
pub struct SessionHost {
    pub queue: Arc<TaskQueue>,
    pub connector: Arc<dyn Connector>,
    pub input: Arc<dyn InputSurface>,
    pub store: Arc<dyn RecordingStore>,
}

/// Where a saved recording ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Stored { key: String },
    Exported { path: PathBuf },
}

#[derive(Debug, Default)]
struct AutoRecord {
    enabled: AtomicBool,
    /// Latched after an auto-start until re-armed by a save or toggle.
    started: AtomicBool,
}

/// Marks a synthetic delivery in progress; capture is suppressed until drop.
struct DeliveryGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

pub struct SessionController {
    this: Weak<SessionController>,
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    queue: Arc<TaskQueue>,
    connector: Arc<dyn Connector>,
    input: Arc<dyn InputSurface>,
    store: Arc<dyn RecordingStore>,
    recorder: Mutex<Recorder>,
    auto_record: AutoRecord,
    replay: Mutex<Option<Arc<Recording>>>,
    replay_start: Mutex<f64>,
    transports: Mutex<Vec<Arc<InterceptedTransport>>>,
    delivering: AtomicBool,
    playback: Arc<PlaybackScheduler>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("recording", &self.is_recording())
            .field("replay_engaged", &self.is_replay_engaged())
            .field("live_transports", &lock_unpoisoned(&self.transports).len())
            .field("playback", &self.playback.phase())
            .finish()
    }
}

impl SessionController {
    pub fn new(config: RecorderConfig, host: SessionHost) -> Arc<Self> {
        let SessionHost {
            queue,
            connector,
            input,
            store,
        } = host;

        Arc::new_cyclic(|this: &Weak<SessionController>| {
            let sink: Weak<dyn PlaybackSink> = this.clone();
            let playback = PlaybackScheduler::new(
                sink,
                Arc::clone(&queue),
                Arc::clone(&input),
                PlaybackTiming {
                    max_wait_ms: config.max_wait_ms,
                    pause_poll_ms: config.pause_poll_ms,
                },
            );
            let auto_record = AutoRecord::default();
            auto_record
                .enabled
                .store(config.auto_record, Ordering::SeqCst);

            Self {
                this: this.clone(),
                clock: queue.clock(),
                recorder: Mutex::new(Recorder::new(config.large_recording_ms)),
                config,
                queue,
                connector,
                input,
                store,
                auto_record,
                replay: Mutex::new(None),
                replay_start: Mutex::new(0.0),
                transports: Mutex::new(Vec::new()),
                delivering: AtomicBool::new(false),
                playback,
            }
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn playback(&self) -> &Arc<PlaybackScheduler> {
        &self.playback
    }

    pub fn store(&self) -> &Arc<dyn RecordingStore> {
        &self.store
    }

    /// Constructs a transport for `url`: a replay fake while replay mode is
    /// engaged, otherwise a live transport whose traffic is captured.
    pub fn open_transport(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError> {
        if self.is_replay_engaged() {
            let controller = self.this.clone();
            let fake = FakeTransport::connect(
                url,
                &self.queue,
                self.config.handshake_delay_ms,
                Box::new(move |fake| {
                    if let Some(controller) = controller.upgrade() {
                        controller.begin_bound_playback(fake);
                    }
                }),
            );
            tracing::info!(url, "replay engaged; serving fake transport");
            return Ok(fake);
        }

        let hook: Weak<dyn CaptureHook> = self.this.clone();
        let transport = InterceptedTransport::connect(url, self.connector.as_ref(), hook)?;
        let mut transports = lock_unpoisoned(&self.transports);
        transports.retain(|existing| existing.ready_state() != ReadyState::Closed);
        transports.push(Arc::clone(&transport));
        Ok(transport)
    }

    /// Live transports that have not closed yet.
    pub fn live_transports(&self) -> Vec<Arc<InterceptedTransport>> {
        lock_unpoisoned(&self.transports)
            .iter()
            .filter(|transport| transport.ready_state() != ReadyState::Closed)
            .cloned()
            .collect()
    }

    pub fn is_recording(&self) -> bool {
        lock_unpoisoned(&self.recorder).is_recording()
    }

    pub fn is_replay_engaged(&self) -> bool {
        lock_unpoisoned(&self.replay).is_some()
    }

    /// Fails with `PlaybackActive` while replay is engaged or playing.
    pub fn start_recording(&self) -> Result<(), SessionError> {
        if self.playback.is_active() || self.is_replay_engaged() {
            return Err(SessionError::PlaybackActive);
        }

        if lock_unpoisoned(&self.recorder).start(self.clock.now_ms()) {
            tracing::info!("recording started");
        }
        Ok(())
    }

    pub fn stop_recording(&self) -> Option<CaptureSummary> {
        let summary = lock_unpoisoned(&self.recorder).stop();
        match &summary {
            Some(summary) => tracing::info!(
                inbound = summary.inbound,
                outbound = summary.outbound,
                duration_ms = summary.duration_ms,
                "recording stopped"
            ),
            None => tracing::debug!("recording stopped with nothing captured"),
        }
        summary
    }

    /// Enables or disables auto-start and re-arms it.
    pub fn set_auto_record(&self, enabled: bool) {
        self.auto_record.enabled.store(enabled, Ordering::SeqCst);
        self.auto_record.started.store(false, Ordering::SeqCst);
    }

    pub fn auto_record_enabled(&self) -> bool {
        self.auto_record.enabled.load(Ordering::SeqCst)
    }

    /// Finalizes the captured buffer and saves it: large recordings are
    /// exported to a file, everything else goes to the store. The recording
    /// must be stopped first.
    pub async fn save_recording(&self, name: &str) -> Result<SaveOutcome, SessionError> {
        let snapshot = self.stopped_snapshot()?;
        let session = snapshot.session();
        let finalized = snapshot.finalize(name).await?;
        let now = unix_time_ms();

        let outcome = if finalized.large {
            let path = export_recording(&finalized.recording, &self.config.export_dir, now)?;
            SaveOutcome::Exported { path }
        } else {
            let key = recording_key(now, &finalized.recording.name);
            self.store.put(&key, &finalized.recording)?;
            tracing::info!(
                key = %key,
                inbound = finalized.inbound,
                outbound = finalized.outbound,
                "recording saved"
            );
            SaveOutcome::Stored { key }
        };

        lock_unpoisoned(&self.recorder).clear_saved(session);
        self.auto_record.started.store(false, Ordering::SeqCst);
        Ok(outcome)
    }

    /// Writes the captured buffer to a file regardless of its length.
    pub async fn export_capture(&self, name: &str) -> Result<PathBuf, SessionError> {
        let snapshot = self.stopped_snapshot()?;
        let finalized = snapshot.finalize(name).await?;
        Ok(export_recording(
            &finalized.recording,
            &self.config.export_dir,
            unix_time_ms(),
        )?)
    }

    /// Loads a stored recording and switches new connections to replay.
    pub fn engage_replay(&self, key: &str) -> Result<Arc<Recording>, SessionError> {
        self.ensure_idle()?;
        let recording = self.store.get(key)?;
        tracing::info!(key, name = %recording.name, "replay engaged");
        self.engage_replay_recording(recording)
    }

    pub fn engage_replay_recording(
        &self,
        recording: Recording,
    ) -> Result<Arc<Recording>, SessionError> {
        self.ensure_idle()?;
        let recording = Arc::new(recording);
        *lock_unpoisoned(&self.replay) = Some(Arc::clone(&recording));
        Ok(recording)
    }

    /// Position (fraction of total duration) the next bound replay starts
    /// from. Reset when that replay finishes.
    pub fn set_replay_start(&self, fraction: f64) -> Result<(), SessionError> {
        if fraction.is_nan() {
            return Err(SessionError::InvalidSeek { fraction });
        }
        *lock_unpoisoned(&self.replay_start) = fraction.clamp(0.0, 1.0);
        Ok(())
    }

    /// Leaves replay mode, stopping any playback in progress.
    pub fn disengage_replay(&self) {
        self.playback.stop();
        if lock_unpoisoned(&self.replay).take().is_some() {
            tracing::info!("replay disengaged");
        }
    }

    /// Replays `recording` into every tracked live transport.
    pub fn replay_into_live(&self, recording: Recording) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.playback.begin(Arc::new(recording), None)
    }

    pub fn pause_playback(&self) -> bool {
        self.playback.pause()
    }

    pub fn resume_playback(&self) -> bool {
        self.playback.resume()
    }

    pub fn toggle_pause(&self) -> PlaybackPhase {
        self.playback.toggle_pause()
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), SessionError> {
        self.playback.set_speed(speed)
    }

    pub fn seek(&self, fraction: f64) -> Result<(), SessionError> {
        self.playback.seek(fraction)
    }

    pub fn stop_playback(&self) {
        self.playback.stop();
    }

    pub fn playback_progress(&self) -> PlaybackProgress {
        self.playback.progress()
    }

    /// Delivers one recorded message as if it had just arrived.
    ///
    /// Capture is suppressed for the duration. A payload that fails to decode
    /// aborts only this delivery.
    pub fn deliver(
        &self,
        message: &RecordedMessage,
        transport: Option<&FakeTransport>,
    ) -> DeliveryReport {
        let _guard = DeliveryGuard::enter(&self.delivering);

        let payload = match codec::deserialize(&message.data) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    %error,
                    relative_time_ms = message.relative_time_ms,
                    "skipping undecodable recorded message"
                );
                return DeliveryReport::default();
            }
        };

        if let (Some(angle), Some(viewport)) = (extract_angle(&payload), self.input.viewport()) {
            self.input.dispatch_pointer_move(pointer_for_angle(
                viewport,
                angle,
                self.config.pointer_radius,
            ));
        }

        let report = match transport {
            Some(fake) => fake.deliver_message(payload),
            None => {
                let event = TransportEvent::Message { payload };
                let mut report = DeliveryReport::default();
                for live in self.live_transports() {
                    report.merge(live.events().emit(&event));
                }
                report
            }
        };

        if !report.is_clean() {
            tracing::warn!(
                failures = report.failures.len(),
                delivered = report.delivered,
                "recorded message delivered with listener failures"
            );
        }
        report
    }

    fn stopped_snapshot(&self) -> Result<CaptureSnapshot, SessionError> {
        let recorder = lock_unpoisoned(&self.recorder);
        if recorder.is_recording() {
            return Err(SessionError::RecordingActive);
        }
        Ok(recorder.snapshot())
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_recording() {
            return Err(SessionError::RecordingActive);
        }
        if self.playback.is_active() {
            return Err(SessionError::PlaybackActive);
        }
        Ok(())
    }

    fn begin_bound_playback(&self, fake: Arc<FakeTransport>) {
        let Some(recording) = lock_unpoisoned(&self.replay).clone() else {
            tracing::debug!(url = %fake.url(), "replay disengaged before fake transport opened");
            return;
        };

        if self.is_recording() {
            tracing::warn!(url = %fake.url(), "recording active; closing fake transport without playback");
            fake.close(None, Some("recording in progress"));
            return;
        }

        if let Err(error) = self.playback.begin(recording, Some(Arc::clone(&fake))) {
            tracing::warn!(%error, url = %fake.url(), "fake transport opened but playback did not start");
            fake.close(None, Some("replay already in progress"));
            return;
        }

        let start = *lock_unpoisoned(&self.replay_start);
        if start > 0.0 {
            if let Err(error) = self.playback.seek(start) {
                tracing::warn!(%error, "replay start position rejected");
            }
        }
    }

    fn capture(&self, direction: Direction, payload: &WirePayload) {
        if self.delivering.load(Ordering::SeqCst) {
            return;
        }

        let now = self.clock.now_ms();
        let replaying = self.playback.is_active() || self.is_replay_engaged();
        let mut recorder = lock_unpoisoned(&self.recorder);
        if !recorder.is_recording()
            && !replaying
            && self.auto_record.enabled.load(Ordering::SeqCst)
            && !self.auto_record.started.load(Ordering::SeqCst)
            && should_auto_start(payload)
        {
            recorder.start(now);
            self.auto_record.started.store(true, Ordering::SeqCst);
            tracing::info!(direction = direction.as_str(), "recording auto-started");
        }

        if recorder.capture(direction, payload.clone(), now) == CaptureOutcome::CapturedLarge {
            tracing::warn!(
                threshold_ms = self.config.large_recording_ms,
                "recording is large; it will be exported to a file when saved"
            );
        }
    }
}

impl CaptureHook for SessionController {
    fn on_send(&self, _url: &str, payload: &WirePayload) {
        self.capture(Direction::Outbound, payload);
    }

    fn on_receive(&self, _url: &str, payload: &WirePayload) {
        self.capture(Direction::Inbound, payload);
    }
}

impl PlaybackSink for SessionController {
    fn deliver(&self, message: &RecordedMessage, transport: Option<&FakeTransport>) {
        SessionController::deliver(self, message, transport);
    }

    fn playback_finished(&self) {
        *lock_unpoisoned(&self.replay_start) = 0.0;
        if lock_unpoisoned(&self.replay).take().is_some() {
            tracing::info!("replay finished; new connections are live again");
        }
    }
}
