//! Payload model and the capture-side pipeline: classification, redaction,
//! serialization, angle extraction and the recording buffer.

pub mod codec;
pub mod payload;
pub mod recorder;
pub mod semantic;
