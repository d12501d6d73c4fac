use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::RecordingStoreError;
use crate::paths::{export_file_name, recording_key};
use crate::schema::{RecordedMessage, Recording, FORMAT_VERSION};
use crate::store::RecordingStore;

/// Current wall-clock time as unix milliseconds.
#[must_use]
pub fn unix_time_ms() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}

/// Writes `recording` as a standalone JSON artifact under `dir`.
pub fn export_recording(
    recording: &Recording,
    dir: &Path,
    exported_at_ms: u64,
) -> Result<PathBuf, RecordingStoreError> {
    fs::create_dir_all(dir)
        .map_err(|source| RecordingStoreError::io("creating export directory", dir, source))?;

    let path = dir.join(export_file_name(&recording.name, exported_at_ms));
    let encoded = serde_json::to_string_pretty(recording)
        .map_err(|source| RecordingStoreError::json(recording.name.clone(), source))?;
    fs::write(&path, encoded)
        .map_err(|source| RecordingStoreError::io("writing export file", &path, source))?;

    tracing::info!(
        name = %recording.name,
        path = %path.display(),
        messages = recording.message_count,
        "exported recording"
    );
    Ok(path)
}

/// Parses and validates an uploaded recording artifact.
///
/// A file must carry a string `name` and a `messages` array; every message
/// must have a known direction, a payload envelope and a relative time, and
/// relative times must start at zero and never decrease.
pub fn parse_import(text: &str) -> Result<Recording, RecordingStoreError> {
    let document: Value = serde_json::from_str(text)
        .map_err(|error| RecordingStoreError::import(format!("not valid JSON: {error}")))?;

    let Value::Object(fields) = &document else {
        return Err(RecordingStoreError::import("top level must be an object"));
    };

    let name = match fields.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => return Err(RecordingStoreError::import("missing recording name")),
    };

    let Some(Value::Array(raw_messages)) = fields.get("messages") else {
        return Err(RecordingStoreError::import("missing messages list"));
    };

    let messages = raw_messages
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_value::<RecordedMessage>(raw.clone()).map_err(|error| {
                RecordingStoreError::import(format!("message {index} is malformed: {error}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let version = match fields.get("version") {
        None => FORMAT_VERSION,
        Some(value) => value
            .as_u64()
            .and_then(|version| u32::try_from(version).ok())
            .ok_or_else(|| RecordingStoreError::import("version must be a positive integer"))?,
    };
    if version != FORMAT_VERSION {
        return Err(RecordingStoreError::import(format!(
            "unsupported format version {version}; expected {FORMAT_VERSION}"
        )));
    }

    let recording = Recording {
        name,
        messages,
        total_duration_ms: 0,
        message_count: 0,
        version,
    }
    .normalized();

    if !recording.is_time_ordered() {
        return Err(RecordingStoreError::import(
            "relative times must start at 0 and never decrease",
        ));
    }

    Ok(recording)
}

pub fn import_recording_file(path: &Path) -> Result<Recording, RecordingStoreError> {
    let text = fs::read_to_string(path)
        .map_err(|source| RecordingStoreError::io("reading import file", path, source))?;
    parse_import(&text)
}

/// Imports `path` into `store` under a fresh key and returns that key.
///
/// The store is not touched when validation fails.
pub fn import_into(
    store: &dyn RecordingStore,
    path: &Path,
    imported_at_ms: u64,
) -> Result<String, RecordingStoreError> {
    let recording = import_recording_file(path)?;
    let key = recording_key(imported_at_ms, &recording.name);
    store.put(&key, &recording)?;

    tracing::info!(key, name = %recording.name, "imported recording");
    Ok(key)
}
