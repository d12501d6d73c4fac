//! Time, playback and session orchestration.

pub mod clock;
pub mod playback;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock, TaskId, TaskQueue};
pub use playback::{
    PlaybackPhase, PlaybackProgress, PlaybackScheduler, PlaybackSink, PlaybackTiming,
};
pub use session::{SaveOutcome, SessionController, SessionHost};
