//! Stage-transition polling.
//!
//! Polls the page's state-observation port on a fixed interval and persists a
//! snapshot whenever the stage discriminant changes. Each tick is one atomic
//! observation (stage, variables, and markup read back-to-back) and ticks
//! never overlap: a tick's work completes before the next is scheduled.
//!
//! If the discriminant moves by more than one between polls, only the
//! terminal value is captured; the skipped intermediates stay uncaptured for
//! that session. A decreasing discriminant is treated like any other
//! transition and overwrites the earlier capture for that index.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::driver::{PageDriver, StateObservation, StateProbe};
use crate::record::SessionId;
use crate::snapshot::{Snapshot, SnapshotStore};

pub struct SnapshotCapture {
    probe: StateProbe,
    store: SnapshotStore,
    interval: Duration,
    captured: Arc<Mutex<Vec<i64>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SnapshotCapture {
    pub fn new(probe: StateProbe, store: SnapshotStore, interval: Duration) -> Self {
        Self {
            probe,
            store,
            interval,
            captured: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Begin polling `driver` for stage transitions of `session_id`.
    /// `session_start` anchors the `captured_at` offsets.
    pub fn start(&mut self, driver: Arc<dyn PageDriver>, session_id: SessionId, session_start: Instant) {
        let probe = self.probe.clone();
        let store = self.store.clone();
        let captured = self.captured.clone();
        let cancel = self.cancel.clone();
        let poll_interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_stage: Option<i64> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let observation = match driver.observe_state(&probe).await {
                    Ok(observation) => observation,
                    Err(err) => {
                        tracing::debug!(error = %err, "state observation failed; stopping snapshot capture");
                        break;
                    }
                };

                if observation.stage < 0 || last_stage == Some(observation.stage) {
                    continue;
                }

                let snapshot = snapshot_from(
                    &probe,
                    &observation,
                    session_start.elapsed().as_secs_f64(),
                );
                match store.persist(&session_id, &snapshot) {
                    Ok(path) => {
                        tracing::info!(
                            session = %session_id,
                            stage = observation.stage,
                            path = %path.display(),
                            "captured stage snapshot"
                        );
                        captured.lock().push(observation.stage);
                        // Advance only after a successful persist so a failed
                        // write is retried on the next tick.
                        last_stage = Some(observation.stage);
                    }
                    Err(err) => {
                        tracing::error!(
                            session = %session_id,
                            stage = observation.stage,
                            error = %err,
                            "snapshot persist failed; transition will be retried"
                        );
                    }
                }
            }
        });
        self.task = Some(task);
    }

    /// Stop polling and return the distinct stage indices captured, sorted.
    pub async fn stop(&mut self) -> Vec<i64> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        let mut stages = self.captured.lock().clone();
        stages.sort_unstable();
        stages.dedup();
        stages
    }
}

/// Build the snapshot for an observation: scalar variables only, with the
/// stage discriminant lifted out of the map into the index.
fn snapshot_from(probe: &StateProbe, observation: &StateObservation, captured_at: f64) -> Snapshot {
    let variables: BTreeMap<String, Value> = observation
        .variables
        .iter()
        .filter(|(name, value)| name.as_str() != probe.stage_variable && is_scalar(value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Snapshot {
        stage_index: observation.stage,
        variables,
        markup: observation.markup.clone(),
        captured_at,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_) | Value::String(_))
}
