//! Integration tests for the record -> persist -> load -> replay flow
//!
//! Everything runs against MockPageDriver so timing is exact under the
//! paused tokio clock and no browser is needed.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use encore::record::capture::{DRAIN_SCRIPT, STOP_FLAG_SCRIPT};
use encore::{
    DriverAction, MockPageDriver, PageDriver, RecordedEvent, SessionReplayer,
};

use super::common;

#[tokio::test(start_paused = true)]
async fn recording_persists_drained_events_in_capture_order() {
    let (_dir, events, snapshots) = common::temp_stores();
    let mock = Arc::new(MockPageDriver::new());

    // Two drain windows: one event in the first, two in the second, then the
    // in-page save flag goes up.
    mock.push_eval(
        DRAIN_SCRIPT,
        json!([{ "type": "click", "selector": "#start", "x": 40.0, "y": 80.0, "timestamp": 0.5 }]),
    );
    mock.push_eval(STOP_FLAG_SCRIPT, json!(false));
    mock.push_eval(
        DRAIN_SCRIPT,
        json!([
            { "type": "keypress", "key": "Enter", "timestamp": 1.2 },
            { "type": "scroll", "scrollX": 0.0, "scrollY": 640.0, "timestamp": 2.0 }
        ]),
    );
    mock.push_eval(STOP_FLAG_SCRIPT, json!(true));

    let session = encore::RecordingSession::new("demo/index.html", events.clone(), snapshots);
    let driver: Arc<dyn PageDriver> = mock.clone();
    let cancel = CancellationToken::new();

    let summary = session.record(driver, &cancel).await.unwrap();
    assert_eq!(summary.event_count, 3);

    // Observer is installed before navigation.
    let actions = mock.actions();
    assert_eq!(actions[0], DriverAction::InitScript);
    assert!(matches!(actions[1], DriverAction::Navigate(_)));

    let loaded = events.load(&summary.session_id).unwrap();
    assert_eq!(loaded.html_path, "demo/index.html");
    assert_eq!(loaded.events.len(), 3);
    let offsets: Vec<f64> = loaded.events.iter().map(|e| e.offset()).collect();
    assert_eq!(offsets, vec![0.5, 1.2, 2.0]);
    let kinds: Vec<&str> = loaded.events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["click", "key", "scroll"]);
}

#[tokio::test]
async fn persisted_recording_loads_back_equal() {
    let (_dir, events, _snapshots) = common::temp_stores();
    let recording = common::sample_recording("session_equal");

    events.persist(&recording).unwrap();
    let loaded = events.load(&recording.session_id).unwrap();
    assert_eq!(loaded, recording);
}

#[tokio::test(start_paused = true)]
async fn replay_of_a_loaded_recording_preserves_order_and_timing() {
    let (_dir, events, _snapshots) = common::temp_stores();
    let recording = common::sample_recording("session_timing");
    events.persist(&recording).unwrap();
    let loaded = events.load(&recording.session_id).unwrap();

    let mock = Arc::new(MockPageDriver::new());
    let driver: Arc<dyn PageDriver> = mock.clone();
    let cancel = CancellationToken::new();

    let summary = SessionReplayer::new()
        .replay(&loaded, &driver, 2.0, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.failed, 0);
    assert!(!summary.cancelled);

    let records = mock.records();
    assert_eq!(
        mock.actions(),
        vec![
            DriverAction::ClickSelector("#start".to_string()),
            DriverAction::ClickSelector(".post".to_string()),
            DriverAction::Scroll(0.0, 640.0),
        ]
    );
    // Offsets [0.5, 3.2, 8.1] at 2x: gaps of 1.35s and 2.45s.
    let gap_1 = records[1].at.duration_since(records[0].at).as_secs_f64();
    let gap_2 = records[2].at.duration_since(records[1].at).as_secs_f64();
    assert!((gap_1 - 1.35).abs() < 1e-6, "gap was {gap_1}");
    assert!((gap_2 - 2.45).abs() < 1e-6, "gap was {gap_2}");
}

#[tokio::test(start_paused = true)]
async fn replay_against_a_modified_page_degrades_to_coordinates() {
    let (_dir, events, _snapshots) = common::temp_stores();
    let recording = common::sample_recording("session_drift");
    events.persist(&recording).unwrap();
    let loaded = events.load(&recording.session_id).unwrap();

    let mock = Arc::new(MockPageDriver::new());
    // The page was edited since recording; the second click's selector is gone.
    mock.fail_selector(".post");
    let driver: Arc<dyn PageDriver> = mock.clone();
    let cancel = CancellationToken::new();

    let summary = SessionReplayer::new()
        .replay(&loaded, &driver, 1.0, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.fallbacks, 1);
    assert_eq!(
        mock.actions(),
        vec![
            DriverAction::ClickSelector("#start".to_string()),
            DriverAction::ClickSelector(".post".to_string()),
            DriverAction::ClickAt(120.0, 300.0),
            DriverAction::Scroll(0.0, 640.0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn total_replay_time_scales_with_speed() {
    let recording = common::sample_recording("session_scale");
    let replayer = SessionReplayer::new();

    for speed in [0.5, 1.0, 4.0] {
        let mock = Arc::new(MockPageDriver::new());
        let driver: Arc<dyn PageDriver> = mock.clone();
        let cancel = CancellationToken::new();

        let summary = replayer
            .replay(&recording, &driver, speed, &cancel)
            .await
            .unwrap();

        let expected = recording.events.last().unwrap().offset() / speed;
        assert!(
            (summary.wall_clock.as_secs_f64() - expected).abs() < 1e-6,
            "speed {speed}: wall clock {:?}",
            summary.wall_clock
        );
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_offsets_keep_relative_order() {
    let mut recording = common::sample_recording("session_dup");
    recording.events = vec![
        RecordedEvent::Key {
            key: "a".to_string(),
            timestamp: 1.0,
        },
        RecordedEvent::Key {
            key: "b".to_string(),
            timestamp: 1.0,
        },
        RecordedEvent::Key {
            key: "c".to_string(),
            timestamp: 1.0,
        },
    ];

    let mock = Arc::new(MockPageDriver::new());
    let driver: Arc<dyn PageDriver> = mock.clone();
    let cancel = CancellationToken::new();

    SessionReplayer::new()
        .replay(&recording, &driver, 1.0, &cancel)
        .await
        .unwrap();

    assert_eq!(
        mock.actions(),
        vec![
            DriverAction::Key("a".to_string()),
            DriverAction::Key("b".to_string()),
            DriverAction::Key("c".to_string()),
        ]
    );
}
