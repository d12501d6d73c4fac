//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use recording_store::RECORDING_DIR;

pub const DEFAULT_LARGE_RECORDING_MS: u64 = 100_000;
pub const DEFAULT_HANDSHAKE_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_WAIT_MS: u64 = 100;
pub const DEFAULT_PAUSE_POLL_MS: u64 = 50;
pub const DEFAULT_POINTER_RADIUS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Start recording on the first meaningful live message.
    pub auto_record: bool,
    /// Recordings at least this long are exported to a file instead of stored.
    pub large_recording_ms: u64,
    /// Simulated handshake latency before a fake transport opens.
    pub handshake_delay_ms: u64,
    /// Longest single wait of the playback loop.
    pub max_wait_ms: u64,
    pub pause_poll_ms: u64,
    /// Distance of synthetic pointer moves from the viewport center.
    pub pointer_radius: f64,
    pub store_dir: PathBuf,
    pub export_dir: PathBuf,
    pub log_filter: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            auto_record: true,
            large_recording_ms: DEFAULT_LARGE_RECORDING_MS,
            handshake_delay_ms: DEFAULT_HANDSHAKE_DELAY_MS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            pause_poll_ms: DEFAULT_PAUSE_POLL_MS,
            pointer_radius: DEFAULT_POINTER_RADIUS,
            store_dir: RECORDING_DIR.iter().collect(),
            export_dir: PathBuf::from("."),
            log_filter: None,
        }
    }
}

impl RecorderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_record: env_bool("WIRE_TAPE_AUTO_RECORD").unwrap_or(defaults.auto_record),
            large_recording_ms: env_parse("WIRE_TAPE_LARGE_RECORDING_MS")
                .unwrap_or(defaults.large_recording_ms),
            handshake_delay_ms: env_parse("WIRE_TAPE_HANDSHAKE_MS")
                .unwrap_or(defaults.handshake_delay_ms),
            max_wait_ms: env_parse("WIRE_TAPE_MAX_WAIT_MS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_wait_ms),
            pause_poll_ms: env_parse("WIRE_TAPE_PAUSE_POLL_MS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.pause_poll_ms),
            pointer_radius: env_parse::<f64>("WIRE_TAPE_POINTER_RADIUS")
                .filter(|value| value.is_finite() && *value >= 0.0)
                .unwrap_or(defaults.pointer_radius),
            store_dir: non_blank_var("WIRE_TAPE_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            export_dir: non_blank_var("WIRE_TAPE_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_dir),
            log_filter: non_blank_var("WIRE_TAPE_LOG"),
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let value = non_blank_var(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    non_blank_var(key).and_then(|value| value.trim().parse().ok())
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
