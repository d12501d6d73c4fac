//! Recording file format and persistence for captured transport sessions.
//!
//! A recording is one JSON document (format version 1):
//!
//! ```json
//! {
//!   "name": "session_12:00:03",
//!   "messages": [
//!     { "type": "in", "data": { "type": "buffer", "value": [1, 2] }, "relativeTime": 0 },
//!     { "type": "out", "data": { "type": "string", "value": "hello" }, "relativeTime": 40 }
//!   ],
//!   "totalDuration": 40,
//!   "messageCount": 2,
//!   "version": 1
//! }
//! ```
//!
//! Stores are addressed by opaque keys of the form `rec_<unix_ms>_<name>`.
//! Large recordings are expected to go through [`export_recording`] rather
//! than a quota-limited [`RecordingStore`].

mod error;
mod paths;
mod schema;
mod store;
mod transfer;

pub use error::{PayloadDecodeError, RecordingStoreError};
pub use paths::{
    export_file_name, recording_key, recording_root, sanitize_name, validate_key, KEY_PREFIX,
    RECORDING_DIR,
};
pub use schema::{
    Direction, PayloadValue, RecordedMessage, RecordedPayload, Recording, FORMAT_VERSION,
};
pub use store::{
    summarize, FileRecordingStore, MemoryRecordingStore, RecordingStore, RecordingSummary,
};
pub use transfer::{
    export_recording, import_into, import_recording_file, parse_import, unix_time_ms,
};
