use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PayloadDecodeError;

/// Current recording file format version.
pub const FORMAT_VERSION: u32 = 1;

const BUFFER_TAG: &str = "buffer";
const STRING_TAG: &str = "string";

/// Which side of the transport produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    Inbound,
    #[serde(rename = "out")]
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "in",
            Self::Outbound => "out",
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self, Self::Inbound)
    }
}

/// Decoded payload of a recorded message: exactly text or a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// Persisted payload envelope, `{"type": "buffer"|"string", "value": ...}`.
///
/// The value is kept as raw JSON so that a single malformed message in an
/// imported file fails only when it is decoded, not when the file is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedPayload {
    #[serde(rename = "type")]
    pub tag: String,
    pub value: Value,
}

impl RecordedPayload {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            tag: STRING_TAG.to_string(),
            value: Value::String(value.into()),
        }
    }

    #[must_use]
    pub fn bytes(value: &[u8]) -> Self {
        Self {
            tag: BUFFER_TAG.to_string(),
            value: Value::Array(value.iter().map(|byte| Value::from(*byte)).collect()),
        }
    }

    pub fn decode(&self) -> Result<PayloadValue, PayloadDecodeError> {
        match self.tag.as_str() {
            BUFFER_TAG => {
                let Value::Array(items) = &self.value else {
                    return Err(PayloadDecodeError::NotAnArray);
                };

                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        item.as_u64()
                            .and_then(|byte| u8::try_from(byte).ok())
                            .ok_or(PayloadDecodeError::InvalidByte { index })
                    })
                    .collect::<Result<Vec<u8>, _>>()
                    .map(PayloadValue::Bytes)
            }
            STRING_TAG => match &self.value {
                Value::String(text) => Ok(PayloadValue::Text(text.clone())),
                _ => Err(PayloadDecodeError::NotAString),
            },
            other => Err(PayloadDecodeError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }
}

impl From<PayloadValue> for RecordedPayload {
    fn from(value: PayloadValue) -> Self {
        match value {
            PayloadValue::Text(text) => Self::text(text),
            PayloadValue::Bytes(bytes) => Self::bytes(&bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedMessage {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub data: RecordedPayload,
    #[serde(rename = "relativeTime")]
    pub relative_time_ms: u64,
}

/// A finalized, named recording.
///
/// `total_duration_ms` and `message_count` are derived from `messages`; use
/// [`Recording::new`] (or [`Recording::normalized`] for foreign input) to keep
/// them consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub name: String,
    pub messages: Vec<RecordedMessage>,
    #[serde(rename = "totalDuration", default)]
    pub total_duration_ms: u64,
    #[serde(rename = "messageCount", default)]
    pub message_count: usize,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl Recording {
    #[must_use]
    pub fn new(name: impl Into<String>, messages: Vec<RecordedMessage>) -> Self {
        Self {
            name: name.into(),
            total_duration_ms: messages.last().map_or(0, |last| last.relative_time_ms),
            message_count: messages.len(),
            messages,
            version: FORMAT_VERSION,
        }
    }

    /// Recomputes derived metadata from the message list.
    #[must_use]
    pub fn normalized(self) -> Self {
        let version = self.version;
        let mut recording = Self::new(self.name, self.messages);
        recording.version = version;
        recording
    }

    pub fn inbound_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.direction.is_inbound())
            .count()
    }

    pub fn outbound_count(&self) -> usize {
        self.messages.len() - self.inbound_count()
    }

    /// True when relative times never decrease and the first one is zero.
    pub fn is_time_ordered(&self) -> bool {
        let starts_at_zero = self
            .messages
            .first()
            .map_or(true, |first| first.relative_time_ms == 0);
        starts_at_zero
            && self
                .messages
                .windows(2)
                .all(|pair| pair[0].relative_time_ms <= pair[1].relative_time_ms)
    }
}
