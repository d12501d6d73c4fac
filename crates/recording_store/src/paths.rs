use std::path::{Path, PathBuf};

use crate::error::RecordingStoreError;

pub const RECORDING_DIR: [&str; 2] = [".wire_tape", "recordings"];

/// Prefix shared by every recording key.
pub const KEY_PREFIX: &str = "rec_";

#[must_use]
pub fn recording_root(cwd: &Path) -> PathBuf {
    cwd.join(RECORDING_DIR[0]).join(RECORDING_DIR[1])
}

/// Replaces characters that cannot appear in a key or file name.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            c if c.is_control() => '-',
            _ => c,
        })
        .collect();

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Builds the opaque store key for a recording created at `created_at_ms`.
#[must_use]
pub fn recording_key(created_at_ms: u64, name: &str) -> String {
    format!("{KEY_PREFIX}{created_at_ms}_{}", sanitize_name(name))
}

/// File name used when exporting a recording as a standalone artifact.
#[must_use]
pub fn export_file_name(name: &str, exported_at_ms: u64) -> String {
    format!("{}_{exported_at_ms}.json", sanitize_name(name))
}

pub fn validate_key(key: &str) -> Result<(), RecordingStoreError> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.starts_with('.') {
        Some("key must not start with '.'")
    } else if key.contains(['/', '\\']) {
        Some("key must not contain path separators")
    } else if key.chars().any(char::is_control) {
        Some("key must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RecordingStoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_embed_creation_time_and_sanitized_name() {
        assert_eq!(
            recording_key(1_700_000_000_000, "session_12:04:05"),
            "rec_1700000000000_session_12-04-05"
        );
        assert_eq!(recording_key(5, "  "), "rec_5_unnamed");
    }

    #[test]
    fn generated_keys_always_validate() {
        for name in ["a/b", "..", "x\\y z", "\u{7}bell"] {
            let key = recording_key(1, name);
            assert!(validate_key(&key).is_ok(), "{key} should be valid");
        }
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(matches!(
            validate_key("../secrets"),
            Err(RecordingStoreError::InvalidKey { .. })
        ));
        assert!(matches!(
            validate_key(""),
            Err(RecordingStoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn export_file_name_uses_name_and_timestamp() {
        assert_eq!(export_file_name("long run", 42), "long-run_42.json");
    }
}
