use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use recording_store::{
    export_recording, import_into, import_recording_file, summarize, unix_time_ms,
    FileRecordingStore, MemoryRecordingStore, Recording, RecordingStore, KEY_PREFIX,
};
use wire_tape::{
    classify, deserialize, Clock, EventKind, HeadlessInput, MemoryConnector, PayloadKind,
    RecorderConfig, SessionController, SessionHost, SystemClock, TaskQueue, Transport,
    WirePayload,
};

const PREVIEW_CHARS: usize = 60;
const PREVIEW_BYTES: usize = 8;

#[derive(Debug, Parser)]
#[command(name = "wire-tape")]
#[command(about = "Inspect, move and replay recorded transport sessions", long_about = None)]
pub struct Cli {
    /// Recording store directory (defaults to WIRE_TAPE_STORE_DIR)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Log filter directive, e.g. `wire_tape=debug`
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List stored recordings
    List,

    /// Print every message of a stored recording
    Show { key: String },

    /// Validate a recording file and add it to the store
    Import { path: PathBuf },

    /// Write a stored recording to a standalone file
    Export {
        key: String,

        /// Output directory (defaults to WIRE_TAPE_EXPORT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove a stored recording
    Delete { key: String },

    /// Play a recording in real time through a fake transport
    Replay {
        /// Stored recording key
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        key: Option<String>,

        /// Replay a recording file instead of a stored key
        #[arg(long)]
        file: Option<PathBuf>,

        /// Playback speed factor
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Start position as a fraction of the total duration
        #[arg(long, default_value_t = 0.0)]
        from: f64,

        /// URL reported by the fake transport
        #[arg(long, default_value = "ws://replay.local/")]
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    pub speed: f64,
    pub from: f64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub closed: bool,
}

pub fn run(cli: Cli, config: &RecorderConfig, out: &mut dyn Write) -> Result<()> {
    let store_dir = cli.store.unwrap_or_else(|| config.store_dir.clone());
    let store = FileRecordingStore::open(&store_dir)
        .with_context(|| format!("opening recording store {}", store_dir.display()))?;

    match cli.command {
        Command::List => list(&store, out),
        Command::Show { key } => show(&store, &key, out),
        Command::Import { path } => {
            let key = import_into(&store, &path, unix_time_ms())
                .with_context(|| format!("importing {}", path.display()))?;
            writeln!(out, "imported {key}")?;
            Ok(())
        }
        Command::Export { key, out: dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let recording = store.get(&key).with_context(|| format!("loading {key}"))?;
            let path = export_recording(&recording, &dir, unix_time_ms())?;
            writeln!(out, "exported {key} to {}", path.display())?;
            Ok(())
        }
        Command::Delete { key } => {
            store.delete(&key).with_context(|| format!("deleting {key}"))?;
            writeln!(out, "deleted {key}")?;
            Ok(())
        }
        Command::Replay {
            key,
            file,
            speed,
            from,
            url,
        } => {
            let recording = match (key, file) {
                (Some(key), None) => store.get(&key).with_context(|| format!("loading {key}"))?,
                (None, Some(path)) => import_recording_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                _ => bail!("pass either a recording key or --file"),
            };

            let queue = Arc::new(TaskQueue::new(Arc::new(SystemClock::new())));
            let summary = replay(
                recording,
                &ReplayOptions { speed, from, url },
                config,
                queue,
                |queue| queue.run_blocking_once(),
                out,
            )?;
            writeln!(out, "replayed {} messages", summary.delivered)?;
            Ok(())
        }
    }
}

pub fn list(store: &dyn RecordingStore, out: &mut dyn Write) -> Result<()> {
    let summaries = summarize(store, KEY_PREFIX)?;
    if summaries.is_empty() {
        writeln!(out, "no recordings")?;
        return Ok(());
    }

    for summary in summaries {
        writeln!(
            out,
            "{}\t{}\t{}ms\t{} in / {} out",
            summary.key, summary.name, summary.duration_ms, summary.inbound, summary.outbound
        )?;
    }
    Ok(())
}

pub fn show(store: &dyn RecordingStore, key: &str, out: &mut dyn Write) -> Result<()> {
    let recording = store.get(key).with_context(|| format!("loading {key}"))?;
    writeln!(
        out,
        "{} ({} messages, {}ms)",
        recording.name, recording.message_count, recording.total_duration_ms
    )?;

    for message in &recording.messages {
        let line = match deserialize(&message.data) {
            Ok(payload) => describe(&payload),
            Err(error) => format!("<{error}>"),
        };
        writeln!(
            out,
            "{:>8}ms {:<3} {line}",
            message.relative_time_ms,
            message.direction.as_str()
        )?;
    }
    Ok(())
}

/// Plays `recording` through a fake transport, pumping `queue` with `pump`
/// until it reports no more work. Delivered messages are written to `out` as
/// they arrive.
pub fn replay(
    recording: Recording,
    options: &ReplayOptions,
    config: &RecorderConfig,
    queue: Arc<TaskQueue>,
    mut pump: impl FnMut(&TaskQueue) -> bool,
    out: &mut dyn Write,
) -> Result<ReplaySummary> {
    let controller = SessionController::new(
        config.clone(),
        SessionHost {
            queue: Arc::clone(&queue),
            connector: Arc::new(MemoryConnector::new()),
            input: Arc::new(HeadlessInput),
            store: Arc::new(MemoryRecordingStore::new()),
        },
    );
    controller.set_speed(options.speed)?;
    controller.set_replay_start(options.from)?;
    controller.engage_replay_recording(recording)?;
    let transport = controller.open_transport(&options.url)?;

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let clock = queue.clock();
    transport.events().on(EventKind::Message, move |event| {
        if let Some(payload) = event.payload() {
            let line = format!("{:>8}ms in  {}", clock.now_ms(), describe(payload));
            if let Ok(mut lines) = sink.lock() {
                lines.push(line);
            }
        }
    });
    let closed = Arc::new(Mutex::new(false));
    let close_flag = Arc::clone(&closed);
    transport.events().on(EventKind::Close, move |_| {
        if let Ok(mut closed) = close_flag.lock() {
            *closed = true;
        }
    });

    let mut delivered = 0;
    loop {
        let more = pump(&queue);
        let batch: Vec<String> = match lines.lock() {
            Ok(mut lines) => lines.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for line in batch {
            writeln!(out, "{line}")?;
            delivered += 1;
        }
        if !more {
            break;
        }
    }

    tracing::debug!(delivered, "replay command finished");
    Ok(ReplaySummary {
        delivered,
        closed: closed.lock().map(|closed| *closed).unwrap_or(false),
    })
}

/// One-line description of a payload: kind, size and a short preview.
pub fn describe(payload: &WirePayload) -> String {
    let info = classify(payload);
    let preview = match payload {
        WirePayload::Text(text) => {
            let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
            if info.size > PREVIEW_CHARS {
                preview.push('…');
            }
            preview
        }
        _ => payload
            .as_bytes()
            .map(|bytes| {
                let mut hex: Vec<String> = bytes
                    .iter()
                    .take(PREVIEW_BYTES)
                    .map(|byte| format!("{byte:02x}"))
                    .collect();
                if bytes.len() > PREVIEW_BYTES {
                    hex.push("..".to_string());
                }
                hex.join(" ")
            })
            .unwrap_or_default(),
    };

    let kind = match info.kind {
        PayloadKind::Text => "text",
        PayloadKind::Buffer => "buffer",
        PayloadKind::View => "view",
        PayloadKind::Blob => "blob",
    };
    format!("{kind}({}) {preview}", info.size)
}
