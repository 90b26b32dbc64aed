//! Shared test utilities for encore
//!
//! This module provides common helpers for integration tests:
//! - Temporary store fixtures
//! - Canned recordings, observations, and profiles

use std::collections::BTreeMap;

use chrono::Local;
use serde_json::{json, Value};
use tempfile::TempDir;

use encore::{
    AppProfile, EventStore, RecordedEvent, Recording, SessionId, SnapshotStore, StateObservation,
};

/// Stores rooted in a fresh temp directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn temp_stores() -> (TempDir, EventStore, SnapshotStore) {
    let dir = TempDir::new().expect("temp dir");
    let events = EventStore::new(dir.path().join("recordings"));
    let snapshots = SnapshotStore::new(dir.path().join("snapshots"));
    (dir, events, snapshots)
}

/// The canonical three-event session: clicks at 0.5s and 3.2s, a scroll at
/// 8.1s.
pub fn sample_events() -> Vec<RecordedEvent> {
    vec![
        RecordedEvent::Click {
            selector: Some("#start".to_string()),
            x: 40.0,
            y: 80.0,
            timestamp: 0.5,
        },
        RecordedEvent::Click {
            selector: Some(".post".to_string()),
            x: 120.0,
            y: 300.0,
            timestamp: 3.2,
        },
        RecordedEvent::Scroll {
            scroll_x: 0.0,
            scroll_y: 640.0,
            timestamp: 8.1,
        },
    ]
}

pub fn sample_recording(id: &str) -> Recording {
    Recording {
        session_id: SessionId::from_string(id),
        started_at: Local::now(),
        html_path: "demo/index.html".to_string(),
        duration_seconds: 9.0,
        events: sample_events(),
    }
}

/// A state observation at `stage` with one counter variable.
pub fn observation(stage: i64, count: i64) -> StateObservation {
    let mut variables = BTreeMap::new();
    variables.insert("stage".to_string(), json!(stage));
    variables.insert("notificationCount".to_string(), json!(count));
    variables.insert("isHellMode".to_string(), json!(stage >= 4));
    StateObservation {
        stage,
        variables,
        markup: format!("<div class=\"feed\">stage {stage}</div>"),
    }
}

/// Profile matching the observations produced by [`observation`].
pub fn sample_profile() -> AppProfile {
    let raw: Value = json!({
        "variables": ["stage", "notificationCount", "isHellMode"],
        "stage_variable": "stage",
        "content_selector": "#contentArea",
        "stages": {
            "0": { "name": "Initial" },
            "1": { "name": "Positive Hook", "entry": "enterStage(1)" },
            "2": { "name": "Addictive Mechanics", "entry": "enterStage(2)" },
            "3": { "name": "Acceleration", "entry": "enterStage(3)" },
            "4": { "name": "Hell Mode", "entry": "enterStage(4)" }
        }
    });
    serde_json::from_value(raw).expect("valid profile")
}
