use std::fs;
use std::sync::Arc;

use clap::Parser;
use pretty_assertions::assert_eq;
use recording_store::{
    Direction, FileRecordingStore, RecordedMessage, RecordedPayload, Recording, RecordingStore,
};
use wire_tape::{ManualClock, RecorderConfig, TaskQueue, WirePayload};
use wire_tape_cli::commands::{
    describe, list, replay, run, show, Cli, Command, ReplayOptions, ReplaySummary,
};

fn message(direction: Direction, at: u64, data: RecordedPayload) -> RecordedMessage {
    RecordedMessage {
        direction,
        data,
        relative_time_ms: at,
    }
}

fn sample_recording() -> Recording {
    Recording::new(
        "duel",
        vec![
            message(Direction::Inbound, 0, RecordedPayload::text("hello there")),
            message(Direction::Outbound, 40, RecordedPayload::text("ack")),
            message(Direction::Inbound, 90, RecordedPayload::bytes(&[0, 45, 7])),
        ],
    )
}

fn output(run: impl FnOnce(&mut Vec<u8>)) -> String {
    let mut out = Vec::new();
    run(&mut out);
    String::from_utf8(out).expect("output should be utf-8")
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("arguments should parse")
}

#[test]
fn describe_previews_text_and_binary_payloads() {
    assert_eq!(describe(&WirePayload::text("hi")), "text(2) hi");
    assert_eq!(
        describe(&WirePayload::buffer(vec![0, 1, 0xab])),
        "buffer(3) 00 01 ab"
    );
    assert_eq!(
        describe(&WirePayload::buffer((0_u8..10).collect::<Vec<_>>())),
        "buffer(10) 00 01 02 03 04 05 06 07 .."
    );

    let long = "x".repeat(70);
    let described = describe(&WirePayload::text(long));
    assert!(described.starts_with("text(70) "), "{described}");
    assert!(described.ends_with('…'), "{described}");
}

#[test]
fn list_reports_empty_store_and_summaries() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let store = FileRecordingStore::open(dir.path()).expect("store should open");

    let empty = output(|out| list(&store, out).expect("list should succeed"));
    assert_eq!(empty, "no recordings\n");

    store
        .put("rec_1_duel", &sample_recording())
        .expect("put should succeed");
    let listed = output(|out| list(&store, out).expect("list should succeed"));
    assert_eq!(listed, "rec_1_duel\tduel\t90ms\t2 in / 1 out\n");
}

#[test]
fn show_prints_one_line_per_message() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let store = FileRecordingStore::open(dir.path()).expect("store should open");
    store
        .put("rec_1_duel", &sample_recording())
        .expect("put should succeed");

    let shown = output(|out| show(&store, "rec_1_duel", out).expect("show should succeed"));
    let lines: Vec<&str> = shown.lines().collect();

    assert_eq!(
        lines,
        vec![
            "duel (3 messages, 90ms)",
            "       0ms in  text(11) hello there",
            "      40ms out text(3) ack",
            "      90ms in  buffer(3) 00 2d 07",
        ]
    );
}

#[test]
fn show_unknown_key_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let store = FileRecordingStore::open(dir.path()).expect("store should open");

    let error = show(&store, "rec_404_missing", &mut Vec::new()).expect_err("key is unknown");
    assert!(error.to_string().contains("rec_404_missing"), "{error:#}");
}

#[test]
fn import_export_and_delete_through_run() {
    let store_dir = tempfile::tempdir().expect("store dir should be created");
    let work_dir = tempfile::tempdir().expect("work dir should be created");
    let store_arg = store_dir.path().to_string_lossy().into_owned();
    let config = RecorderConfig::default();

    let source = work_dir.path().join("duel.json");
    fs::write(
        &source,
        serde_json::to_string(&sample_recording()).expect("recording should encode"),
    )
    .expect("source file should be written");

    let imported = output(|out| {
        run(
            parse(&[
                "wire-tape",
                "--store",
                &store_arg,
                "import",
                &source.to_string_lossy(),
            ]),
            &config,
            out,
        )
        .expect("import should succeed");
    });
    let key = imported
        .trim()
        .strip_prefix("imported ")
        .expect("import should report the key")
        .to_string();
    assert!(key.starts_with("rec_") && key.ends_with("_duel"), "{key}");

    let export_dir = work_dir.path().join("exports");
    let exported = output(|out| {
        run(
            parse(&[
                "wire-tape",
                "export",
                &key,
                "--out",
                &export_dir.to_string_lossy(),
                "--store",
                &store_arg,
            ]),
            &config,
            out,
        )
        .expect("export should succeed");
    });
    assert!(exported.starts_with(&format!("exported {key} to ")), "{exported}");
    let files: Vec<_> = fs::read_dir(&export_dir)
        .expect("export dir should exist")
        .collect();
    assert_eq!(files.len(), 1);

    let deleted = output(|out| {
        run(
            parse(&["wire-tape", "--store", &store_arg, "delete", &key]),
            &config,
            out,
        )
        .expect("delete should succeed");
    });
    assert_eq!(deleted, format!("deleted {key}\n"));

    let store = FileRecordingStore::open(store_dir.path()).expect("store should reopen");
    assert!(store.get(&key).is_err(), "deleted key should be gone");
}

#[test]
fn import_rejects_malformed_files_without_touching_store() {
    let store_dir = tempfile::tempdir().expect("store dir should be created");
    let work_dir = tempfile::tempdir().expect("work dir should be created");
    let store_arg = store_dir.path().to_string_lossy().into_owned();
    let source = work_dir.path().join("broken.json");
    fs::write(&source, "{\"name\":\"broken\"}").expect("source file should be written");

    let error = run(
        parse(&[
            "wire-tape",
            "--store",
            &store_arg,
            "import",
            &source.to_string_lossy(),
        ]),
        &RecorderConfig::default(),
        &mut Vec::new(),
    )
    .expect_err("file without messages should be rejected");

    assert!(format!("{error:#}").contains("messages"), "{error:#}");
    let store = FileRecordingStore::open(store_dir.path()).expect("store should reopen");
    assert!(store
        .list_keys("rec_")
        .expect("list should succeed")
        .is_empty());
}

#[test]
fn replay_requires_exactly_one_source() {
    assert!(Cli::try_parse_from(["wire-tape", "replay"]).is_err());
    assert!(Cli::try_parse_from(["wire-tape", "replay", "rec_1", "--file", "x.json"]).is_err());

    let cli = parse(&["wire-tape", "replay", "rec_1", "--speed", "2"]);
    let Command::Replay {
        key, speed, from, ..
    } = cli.command
    else {
        panic!("expected replay command");
    };
    assert_eq!(key.as_deref(), Some("rec_1"));
    assert_eq!(speed, 2.0);
    assert_eq!(from, 0.0);
}

fn run_replay(recording: Recording, options: ReplayOptions) -> (ReplaySummary, String) {
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(TaskQueue::new(clock.clone()));
    let mut out = Vec::new();
    let summary = replay(
        recording,
        &options,
        &RecorderConfig::default(),
        queue,
        |queue| {
            clock.run_until_idle(queue, 60_000);
            false
        },
        &mut out,
    )
    .expect("replay should succeed");
    (
        summary,
        String::from_utf8(out).expect("output should be utf-8"),
    )
}

fn options(speed: f64, from: f64) -> ReplayOptions {
    ReplayOptions {
        speed,
        from,
        url: "ws://replay.local/".to_string(),
    }
}

#[test]
fn replay_delivers_inbound_messages_on_schedule_and_closes() {
    let (summary, printed) = run_replay(sample_recording(), options(1.0, 0.0));

    assert_eq!(
        summary,
        ReplaySummary {
            delivered: 2,
            closed: true,
        }
    );
    assert_eq!(
        printed.lines().collect::<Vec<_>>(),
        vec![
            "     100ms in  text(11) hello there",
            "     190ms in  buffer(3) 00 2d 07",
        ]
    );
}

#[test]
fn replay_honors_speed_and_start_position() {
    let recording = Recording::new(
        "skip",
        vec![
            message(Direction::Inbound, 0, RecordedPayload::text("first")),
            message(Direction::Inbound, 100, RecordedPayload::text("second")),
            message(Direction::Inbound, 400, RecordedPayload::text("third")),
        ],
    );

    let (summary, printed) = run_replay(recording.clone(), options(1.0, 0.5));
    assert_eq!(summary.delivered, 1);
    assert_eq!(printed, "     300ms in  text(5) third\n");

    let (summary, printed) = run_replay(recording, options(2.0, 0.0));
    assert_eq!(summary.delivered, 3);
    assert_eq!(
        printed.lines().collect::<Vec<_>>(),
        vec![
            "     100ms in  text(5) first",
            "     150ms in  text(6) second",
            "     300ms in  text(5) third",
        ]
    );
}

#[test]
fn replay_rejects_invalid_speed() {
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(TaskQueue::new(clock));
    let error = replay(
        sample_recording(),
        &options(0.0, 0.0),
        &RecorderConfig::default(),
        queue,
        |_| false,
        &mut Vec::new(),
    )
    .expect_err("zero speed should be rejected");

    assert!(error.to_string().contains("speed"), "{error}");
}
