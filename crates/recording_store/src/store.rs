use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::RecordingStoreError;
use crate::paths::validate_key;
use crate::schema::Recording;

const FILE_EXTENSION: &str = "json";

/// Key-value persistence for finished recordings.
pub trait RecordingStore: Send + Sync {
    fn put(&self, key: &str, recording: &Recording) -> Result<(), RecordingStoreError>;

    fn get(&self, key: &str) -> Result<Recording, RecordingStoreError>;

    fn delete(&self, key: &str) -> Result<(), RecordingStoreError>;

    /// Lists keys starting with `prefix`, sorted ascending.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, RecordingStoreError>;
}

/// Directory-backed store: one pretty-printed JSON file per key.
#[derive(Debug, Clone)]
pub struct FileRecordingStore {
    root: PathBuf,
}

impl FileRecordingStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RecordingStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| RecordingStoreError::io("creating recording directory", &root, source))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, RecordingStoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{FILE_EXTENSION}")))
    }
}

impl RecordingStore for FileRecordingStore {
    fn put(&self, key: &str, recording: &Recording) -> Result<(), RecordingStoreError> {
        let path = self.path_for(key)?;
        let encoded = serde_json::to_string_pretty(recording)
            .map_err(|source| RecordingStoreError::json(key, source))?;
        let staging = path.with_extension("json.tmp");

        fs::write(&staging, encoded)
            .map_err(|source| RecordingStoreError::io("writing recording", &staging, source))?;
        fs::rename(&staging, &path)
            .map_err(|source| RecordingStoreError::io("committing recording", &path, source))?;

        tracing::debug!(key, path = %path.display(), "stored recording");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Recording, RecordingStoreError> {
        let path = self.path_for(key)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(RecordingStoreError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(source) => {
                return Err(RecordingStoreError::io("reading recording", &path, source));
            }
        };

        serde_json::from_str(&contents).map_err(|source| RecordingStoreError::json(key, source))
    }

    fn delete(&self, key: &str) -> Result<(), RecordingStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => {
                Err(RecordingStoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(source) => Err(RecordingStoreError::io("deleting recording", &path, source)),
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, RecordingStoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| {
            RecordingStoreError::io("listing recording directory", &self.root, source)
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| {
                RecordingStoreError::io("listing recording directory", &self.root, source)
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// In-process store with an optional byte quota, mirroring small browser-style
/// key-value storage.
#[derive(Debug, Default)]
pub struct MemoryRecordingStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryRecordingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Total bytes of encoded recordings currently held.
    pub fn used_bytes(&self) -> usize {
        lock_unpoisoned(&self.entries)
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    /// Stores raw text under `key` without validating it, as a corrupted or
    /// foreign entry would appear.
    pub fn put_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        lock_unpoisoned(&self.entries).insert(key.into(), raw.into());
    }
}

impl RecordingStore for MemoryRecordingStore {
    fn put(&self, key: &str, recording: &Recording) -> Result<(), RecordingStoreError> {
        validate_key(key)?;
        let encoded =
            serde_json::to_string(recording).map_err(|source| RecordingStoreError::json(key, source))?;

        let mut entries = lock_unpoisoned(&self.entries);
        if let Some(limit) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, value)| existing.len() + value.len())
                .sum();
            let needed = key.len() + encoded.len();
            let available = limit.saturating_sub(used);
            if needed > available {
                return Err(RecordingStoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), encoded);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Recording, RecordingStoreError> {
        let entries = lock_unpoisoned(&self.entries);
        let raw = entries.get(key).ok_or_else(|| RecordingStoreError::NotFound {
            key: key.to_string(),
        })?;
        serde_json::from_str(raw).map_err(|source| RecordingStoreError::json(key, source))
    }

    fn delete(&self, key: &str) -> Result<(), RecordingStoreError> {
        match lock_unpoisoned(&self.entries).remove(key) {
            Some(_) => Ok(()),
            None => Err(RecordingStoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, RecordingStoreError> {
        Ok(lock_unpoisoned(&self.entries)
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// One line of a recordings listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub key: String,
    pub name: String,
    pub duration_ms: u64,
    pub inbound: usize,
    pub outbound: usize,
}

impl RecordingSummary {
    #[must_use]
    pub fn from_recording(key: impl Into<String>, recording: &Recording) -> Self {
        Self {
            key: key.into(),
            name: recording.name.clone(),
            duration_ms: recording.total_duration_ms,
            inbound: recording.inbound_count(),
            outbound: recording.outbound_count(),
        }
    }
}

/// Summarizes every readable recording under `prefix`; unreadable entries are skipped.
pub fn summarize(
    store: &dyn RecordingStore,
    prefix: &str,
) -> Result<Vec<RecordingSummary>, RecordingStoreError> {
    let mut summaries = Vec::new();
    for key in store.list_keys(prefix)? {
        match store.get(&key) {
            Ok(recording) => summaries.push(RecordingSummary::from_recording(key, &recording)),
            Err(error) => tracing::debug!(key, %error, "skipping unreadable recording"),
        }
    }

    Ok(summaries)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
