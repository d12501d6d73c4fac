mod harness;

use std::sync::Arc;

use harness::{harness, harness_with, harness_with_store, text_message};
use pretty_assertions::assert_eq;
use wire_tape::recording_store::{
    import_recording_file, Direction, MemoryRecordingStore, PayloadValue, RecordingStore,
    RecordingStoreError, KEY_PREFIX,
};
use wire_tape::{CaptureSummary, EventKind, SaveOutcome, SessionError, Transport, WirePayload};

#[test]
fn keepalives_do_not_auto_start_but_session_traffic_does() {
    let h = harness();
    let (_transport, peer) = h.open_live("ws://game/socket");

    for keepalive in ["2", "3", "ping", "PONG", "hi"] {
        peer.push(keepalive);
    }
    assert!(!h.controller.is_recording());

    h.advance(10);
    peer.push("{\"name\":\"state\",\"data\":{}}");
    assert!(h.controller.is_recording());
    h.advance(10);
    peer.push("3");

    assert_eq!(
        h.controller.stop_recording(),
        Some(CaptureSummary {
            inbound: 2,
            outbound: 0,
            duration_ms: 10,
        })
    );
}

#[test]
fn binary_traffic_auto_starts_and_outbound_is_captured() {
    let h = harness();
    let (transport, peer) = h.open_live("ws://game/socket");

    transport
        .send(WirePayload::buffer(vec![1]))
        .expect("send should succeed");
    h.advance(25);
    peer.push(vec![0_u8, 90]);

    assert_eq!(peer.sent(), vec![WirePayload::buffer(vec![1])]);
    assert_eq!(
        h.controller.stop_recording(),
        Some(CaptureSummary {
            inbound: 1,
            outbound: 1,
            duration_ms: 25,
        })
    );
}

#[test]
fn disabled_auto_record_captures_nothing() {
    let h = harness_with(|config| config.auto_record = false);
    let (_transport, peer) = h.open_live("ws://game/socket");

    peer.push("{\"name\":\"state\"}");

    assert!(!h.controller.is_recording());
    assert!(!h.controller.auto_record_enabled());
    assert_eq!(h.controller.stop_recording(), None);
}

#[test]
fn auto_start_latch_rearms_on_toggle() {
    let h = harness();
    let (_transport, peer) = h.open_live("ws://game/socket");

    peer.push("first meaningful frame");
    h.controller.stop_recording();
    peer.push("second meaningful frame");
    assert!(!h.controller.is_recording(), "latched after first auto-start");

    h.controller.set_auto_record(true);
    peer.push("third meaningful frame");
    assert!(h.controller.is_recording());
}

#[tokio::test]
async fn saved_recording_is_redacted_and_relative_to_first_message() {
    let h = harness_with(|config| config.auto_record = false);
    let (transport, peer) = h.open_live("ws://game/socket");
    h.controller.start_recording().expect("recording should start");

    h.advance(500);
    transport
        .send(WirePayload::text(
            "{\"name\":\"join\",\"data\":{\"ecp_key\":\"SECRET\",\"key\":\"K-1\",\"steamid\":\"7656\",\"nick\":\"ace\"}}",
        ))
        .expect("send should succeed");
    h.advance(40);
    peer.push(vec![0_u8, 45, 7]);
    h.advance(50);
    peer.push("welcome aboard");
    h.controller.stop_recording();

    let outcome = h
        .controller
        .save_recording("  duel  ")
        .await
        .expect("save should succeed");
    let SaveOutcome::Stored { key } = outcome else {
        panic!("short recording should be stored, got {outcome:?}");
    };
    assert!(key.starts_with(KEY_PREFIX) && key.ends_with("_duel"), "{key}");

    let stored = h.store.get(&key).expect("stored recording should load");
    let times: Vec<u64> = stored
        .messages
        .iter()
        .map(|message| message.relative_time_ms)
        .collect();
    assert_eq!(stored.name, "duel");
    assert_eq!(times, vec![0, 40, 90]);
    assert_eq!(stored.total_duration_ms, 90);
    assert_eq!(stored.message_count, 3);

    let first = stored.messages[0]
        .data
        .decode()
        .expect("first payload should decode");
    let PayloadValue::Text(text) = first else {
        panic!("first payload should be text");
    };
    for secret in ["SECRET", "K-1", "7656"] {
        assert!(!text.contains(secret), "{secret} leaked: {text}");
    }
    assert!(text.contains("\"nick\":\"ace\""));
    assert_eq!(
        stored.messages[1].data.decode(),
        Ok(PayloadValue::Bytes(vec![0, 45, 7]))
    );
}

#[tokio::test]
async fn save_clears_buffer_and_second_save_reports_nothing() {
    let h = harness();
    let (_transport, peer) = h.open_live("ws://game/socket");
    peer.push("meaningful frame");
    h.controller.stop_recording();

    h.controller
        .save_recording("once")
        .await
        .expect("first save should succeed");
    let error = h
        .controller
        .save_recording("twice")
        .await
        .expect_err("buffer should be empty after save");

    assert!(matches!(error, SessionError::EmptyRecording));
    assert_eq!(
        h.store.list_keys(KEY_PREFIX).expect("list should succeed").len(),
        1
    );
}

#[tokio::test]
async fn long_recordings_are_exported_never_stored() {
    let h = harness();
    let (_transport, peer) = h.open_live("ws://game/socket");
    peer.push("opening frame");
    h.advance(100_000);
    peer.push("closing frame");
    h.controller.stop_recording();

    let outcome = h
        .controller
        .save_recording("marathon")
        .await
        .expect("save should succeed");

    let SaveOutcome::Exported { path } = outcome else {
        panic!("large recording must be exported, got {outcome:?}");
    };
    assert!(path.starts_with(h.export_dir.path()));
    let exported = import_recording_file(&path).expect("exported file should import");
    assert_eq!(exported.total_duration_ms, 100_000);
    assert!(h
        .store
        .list_keys(KEY_PREFIX)
        .expect("list should succeed")
        .is_empty());
}

#[tokio::test]
async fn storage_failure_is_reported_and_capture_kept_for_export() {
    let h = harness_with_store(MemoryRecordingStore::with_quota(16));
    let (_transport, peer) = h.open_live("ws://game/socket");
    peer.push("a frame that will not fit in sixteen bytes");
    h.controller.stop_recording();

    let error = h
        .controller
        .save_recording("overflow")
        .await
        .expect_err("quota should be exceeded");
    assert!(matches!(
        error,
        SessionError::Storage(RecordingStoreError::QuotaExceeded { .. })
    ));

    let path = h
        .controller
        .export_capture("overflow")
        .await
        .expect("export should still work");
    assert_eq!(
        import_recording_file(&path)
            .expect("exported file should import")
            .messages
            .len(),
        1
    );
}

#[test]
fn synthetic_delivery_is_never_captured() {
    let h = harness_with(|config| config.auto_record = false);
    let (transport, peer) = h.open_live("ws://game/socket");
    let echo: Arc<dyn Transport> = Arc::clone(&transport);
    transport.events().on(EventKind::Message, move |_| {
        echo.send(WirePayload::text("ack")).expect("echo send");
    });
    h.controller.start_recording().expect("recording should start");

    let report = h.controller.deliver(
        &text_message(Direction::Inbound, 0, "{\"name\":\"replayed\"}"),
        None,
    );

    assert_eq!(report.delivered, 1);
    assert_eq!(peer.sent(), vec![WirePayload::text("ack")]);
    assert_eq!(h.controller.stop_recording(), None);

    h.controller.start_recording().expect("recording should restart");
    peer.push("live frame after replay");
    assert_eq!(
        h.controller.stop_recording(),
        Some(CaptureSummary {
            inbound: 1,
            outbound: 1,
            duration_ms: 0,
        })
    );
}

#[tokio::test]
async fn saving_requires_a_stopped_recording() {
    let h = harness();
    let (_transport, peer) = h.open_live("ws://game/socket");
    peer.push("first meaningful frame");

    let error = h
        .controller
        .save_recording("early")
        .await
        .expect_err("save during capture should be refused");
    assert!(matches!(error, SessionError::RecordingActive));
    let error = h
        .controller
        .export_capture("early")
        .await
        .expect_err("export during capture should be refused");
    assert!(matches!(error, SessionError::RecordingActive));
    assert!(h.controller.is_recording());

    h.advance(20);
    peer.push("second meaningful frame");
    h.controller.stop_recording();
    h.controller
        .save_recording("complete")
        .await
        .expect("save after stop should succeed");

    let keys = h.store.list_keys(KEY_PREFIX).expect("list should succeed");
    assert_eq!(keys.len(), 1);
    let stored = h.store.get(&keys[0]).expect("stored recording should load");
    assert_eq!(stored.message_count, 2);
    assert_eq!(stored.total_duration_ms, 20);
}
