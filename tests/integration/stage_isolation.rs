//! Integration tests for stage snapshot capture and stage isolation
//!
//! SnapshotCapture runs against MockPageDriver observation sequences under
//! the paused tokio clock; StageLoader consumes the stores it fills.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use encore::{
    DriverAction, EngineError, MockPageDriver, PageDriver, SessionId, Snapshot, SnapshotCapture,
    StageLoader,
};

use super::common;

async fn run_capture_into(
    mock: &Arc<MockPageDriver>,
    session: &SessionId,
    ticks: u64,
    store: encore::SnapshotStore,
) -> Vec<i64> {
    let profile = common::sample_profile();
    let mut capture = SnapshotCapture::new(profile.probe(), store, Duration::from_millis(500));
    let driver: Arc<dyn PageDriver> = mock.clone();
    capture.start(driver, session.clone(), Instant::now());
    tokio::time::sleep(Duration::from_millis(500 * ticks + 100)).await;
    capture.stop().await
}

#[tokio::test(start_paused = true)]
async fn contiguous_stage_walk_captures_every_stage() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_walk");
    let mock = Arc::new(MockPageDriver::new());
    mock.push_observation(common::observation(0, 0));
    mock.push_observation(common::observation(1, 5));
    mock.push_observation(common::observation(2, 20));

    let captured = run_capture_into(&mock, &session, 4, snapshots.clone()).await;

    assert_eq!(captured, vec![0, 1, 2]);
    assert_eq!(snapshots.stage_numbers(&session).unwrap(), vec![0, 1, 2]);

    let metadata = snapshots.metadata(&session).unwrap();
    assert_eq!(metadata.stages_captured, 3);
    assert_eq!(metadata.stage_numbers, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn fast_transition_captures_only_the_terminal_stage() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_jump");
    let mock = Arc::new(MockPageDriver::new());
    // The app moved from stage 1 to stage 3 between polls; stage 2 is never
    // observed and stays uncaptured for this session.
    mock.push_observation(common::observation(1, 10));
    mock.push_observation(common::observation(3, 80));

    let captured = run_capture_into(&mock, &session, 3, snapshots.clone()).await;

    assert_eq!(captured, vec![1, 3]);
    assert_eq!(snapshots.stage_numbers(&session).unwrap(), vec![1, 3]);
    assert!(matches!(
        snapshots.load(&session, 2).unwrap_err(),
        EngineError::SnapshotNotFound { stage: 2, .. }
    ));

    // Isolation needs the predecessor snapshot: stage 3's predecessor (2) was
    // skipped, so entering stage 3 in isolation fails even though its own
    // snapshot exists.
    let loader = StageLoader::new(snapshots.clone(), common::sample_profile());
    let driver_mock = Arc::new(MockPageDriver::new());
    driver_mock.set_eval_fallback(json!(true));
    let driver: Arc<dyn PageDriver> = driver_mock.clone();

    let err = loader.load_stage(&session, 3, &driver).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::SnapshotNotFound { stage: 2, .. }
    ));
    assert!(driver_mock.actions().is_empty());

    // Stage 2's predecessor (1) was captured, so that isolation still works.
    let report = loader.load_stage(&session, 2, &driver).await.unwrap();
    assert_eq!(report.restored_stage, 1);
}

#[tokio::test]
async fn isolation_requires_the_predecessor_snapshot() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_sparse");

    // Only stage 3's snapshot exists for this session.
    let snapshot = Snapshot {
        stage_index: 3,
        variables: BTreeMap::from([("notificationCount".to_string(), json!(80))]),
        markup: "<div>stage 3</div>".to_string(),
        captured_at: 12.0,
    };
    snapshots.persist(&session, &snapshot).unwrap();

    let loader = StageLoader::new(snapshots, common::sample_profile());
    let mock = Arc::new(MockPageDriver::new());
    mock.set_eval_fallback(json!(true));
    let driver: Arc<dyn PageDriver> = mock.clone();

    // Stages 2 and 3 both lack their predecessor; no injection is attempted.
    for target in [2, 3] {
        let err = loader.load_stage(&session, target, &driver).await.unwrap_err();
        assert!(matches!(err, EngineError::SnapshotNotFound { .. }));
    }
    assert!(mock.actions().is_empty());

    // Stage 4 consumes the stage-3 snapshot and succeeds.
    let report = loader.load_stage(&session, 4, &driver).await.unwrap();
    assert_eq!(report.restored_stage, 3);
    assert_eq!(mock.injected_variables()["stage"], json!(3));
    assert_eq!(mock.injected_variables()["notificationCount"], json!(80));
}

#[tokio::test(start_paused = true)]
async fn revisited_stage_overwrites_its_earlier_capture() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_revisit");
    let mock = Arc::new(MockPageDriver::new());
    // Stage drops back to 0 (a reset) and then re-enters 1 with new state;
    // each change is captured and the second stage-1 capture wins.
    mock.push_observation(common::observation(1, 5));
    mock.push_observation(common::observation(0, 0));
    mock.push_observation(common::observation(1, 50));

    let captured = run_capture_into(&mock, &session, 4, snapshots.clone()).await;

    assert_eq!(captured, vec![0, 1]);
    assert_eq!(snapshots.stage_numbers(&session).unwrap(), vec![0, 1]);
    let loaded = snapshots.load(&session, 1).unwrap();
    assert_eq!(loaded.variables["notificationCount"], json!(50));
}

#[tokio::test]
async fn injection_is_best_effort_and_still_invokes_the_entry_hook() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_partial");

    let snapshot = Snapshot {
        stage_index: 2,
        variables: BTreeMap::from([
            ("notificationCount".to_string(), json!(40)),
            ("tapCount".to_string(), json!(12)),
            ("isHellMode".to_string(), json!(false)),
        ]),
        markup: "<div class=\"feed\">stage 2</div>".to_string(),
        captured_at: 8.0,
    };
    snapshots.persist(&session, &snapshot).unwrap();

    let mock = Arc::new(MockPageDriver::new());
    mock.set_eval_fallback(json!(true));
    mock.fail_variable("tapCount");
    let driver: Arc<dyn PageDriver> = mock.clone();

    let loader = StageLoader::new(snapshots, common::sample_profile());
    let report = loader.load_stage(&session, 3, &driver).await.unwrap();

    assert_eq!(report.target_stage, 3);
    assert_eq!(report.restored_stage, 2);
    assert_eq!(report.failed, vec!["tapCount".to_string()]);
    // stage + notificationCount + isHellMode made it in.
    assert_eq!(report.injected, 3);
    assert!(report.markup_restored);
    assert!(report.entry_invoked);

    let vars = mock.injected_variables();
    assert_eq!(vars["stage"], json!(2));
    assert_eq!(vars["notificationCount"], json!(40));
    assert!(!vars.contains_key("tapCount"));

    // The app's own entry hook for the target stage is what resumes logic.
    assert!(mock
        .actions()
        .iter()
        .any(|a| matches!(a, DriverAction::Evaluate(s) if s == "enterStage(3)")));
}

#[tokio::test(start_paused = true)]
async fn capture_and_isolation_roundtrip() {
    let (_dir, _events, snapshots) = common::temp_stores();
    let session = SessionId::from_string("session_roundtrip");
    let recorder_mock = Arc::new(MockPageDriver::new());
    recorder_mock.push_observation(common::observation(0, 0));
    recorder_mock.push_observation(common::observation(1, 8));

    let captured = run_capture_into(&recorder_mock, &session, 3, snapshots.clone()).await;
    assert_eq!(captured, vec![0, 1]);

    // Fresh page context for the restore; no events replayed.
    let fresh_mock = Arc::new(MockPageDriver::new());
    fresh_mock.set_eval_fallback(json!(true));
    let fresh: Arc<dyn PageDriver> = fresh_mock.clone();

    let loader = StageLoader::new(snapshots, common::sample_profile());
    let report = loader.load_stage(&session, 1, &fresh).await.unwrap();

    assert_eq!(report.restored_stage, 0);
    assert!(report.failed.is_empty());
    assert!(report.entry_invoked);
    assert_eq!(fresh_mock.injected_variables()["stage"], json!(0));
    assert!(!fresh_mock
        .actions()
        .iter()
        .any(|a| matches!(a, DriverAction::ClickSelector(_) | DriverAction::ClickAt(_, _))));
}
