//! Conversion between live payloads and their persisted form, with
//! field-level redaction of structured text.

use recording_store::{PayloadDecodeError, PayloadValue, RecordedPayload};
use serde_json::Value;
use thiserror::Error;

use crate::core::payload::{BlobReadError, WirePayload};

/// Record field whose sub-fields are subject to redaction.
pub const REDACTED_CONTAINER: &str = "data";

/// Replacement written over a sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    EmptyString,
    Null,
}

impl Replacement {
    fn to_value(self) -> Value {
        match self {
            Self::EmptyString => Value::String(String::new()),
            Self::Null => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionRule {
    pub field: &'static str,
    pub replacement: Replacement,
}

/// Sensitive sub-fields of the `data` record.
pub const REDACTION_RULES: &[RedactionRule] = &[
    RedactionRule {
        field: "ecp_key",
        replacement: Replacement::EmptyString,
    },
    RedactionRule {
        field: "key",
        replacement: Replacement::EmptyString,
    },
    RedactionRule {
        field: "steamid",
        replacement: Replacement::Null,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Buffer,
    View,
    Blob,
}

impl PayloadKind {
    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// Kind and length of a live payload. Text length counts characters,
/// binary length counts bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadInfo {
    pub kind: PayloadKind,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed recorded payload: {0}")]
pub struct DecodeError(#[from] pub PayloadDecodeError);

pub fn classify(payload: &WirePayload) -> PayloadInfo {
    match payload {
        WirePayload::Text(text) => PayloadInfo {
            kind: PayloadKind::Text,
            size: text.chars().count(),
        },
        WirePayload::Buffer(bytes) => PayloadInfo {
            kind: PayloadKind::Buffer,
            size: bytes.len(),
        },
        WirePayload::View(view) => PayloadInfo {
            kind: PayloadKind::View,
            size: view.as_bytes().len(),
        },
        WirePayload::Blob(blob) => PayloadInfo {
            kind: PayloadKind::Blob,
            size: blob.size(),
        },
    }
}

/// Converts a live payload into its persisted envelope.
///
/// Text is redacted first. Blobs are read to completion, which is the only
/// step that may suspend.
pub async fn serialize(payload: &WirePayload) -> Result<RecordedPayload, BlobReadError> {
    let value = match payload {
        WirePayload::Text(text) => PayloadValue::Text(redact(text)),
        WirePayload::Buffer(bytes) => PayloadValue::Bytes(bytes.clone()),
        WirePayload::View(view) => PayloadValue::Bytes(view.as_bytes().to_vec()),
        WirePayload::Blob(blob) => PayloadValue::Bytes(blob.bytes().await?),
    };

    Ok(RecordedPayload::from(value))
}

/// Rebuilds a live payload; bytes come back as a [`WirePayload::Buffer`].
pub fn deserialize(payload: &RecordedPayload) -> Result<WirePayload, DecodeError> {
    Ok(match payload.decode()? {
        PayloadValue::Text(text) => WirePayload::Text(text),
        PayloadValue::Bytes(bytes) => WirePayload::Buffer(bytes),
    })
}

/// Strips sensitive fields from a structured text payload.
///
/// Text that does not parse, or that carries no sensitive field, is returned
/// unchanged.
pub fn redact(text: &str) -> String {
    let Ok(mut record) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };

    let Some(Value::Object(data)) = record.get_mut(REDACTED_CONTAINER) else {
        return text.to_string();
    };

    let mut redacted = false;
    for rule in REDACTION_RULES {
        if let Some(value) = data.get_mut(rule.field) {
            *value = rule.replacement.to_value();
            redacted = true;
        }
    }

    if !redacted {
        return text.to_string();
    }

    match serde_json::to_string(&record) {
        Ok(encoded) => encoded,
        Err(error) => {
            tracing::warn!(%error, "failed to re-encode redacted payload; dropping sensitive record body");
            String::new()
        }
    }
}
