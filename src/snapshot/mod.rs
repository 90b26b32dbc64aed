//! Stage-indexed application snapshots.
//!
//! A snapshot records the target application's state immediately after it
//! entered a stage: the named variables (scalars only, no live references)
//! and the serialized markup of its render region. Equivalently, it is the
//! terminal state of the preceding stage, which is how the stage loader
//! consumes it.

pub mod capture;
pub mod loader;
pub mod store;

pub use capture::SnapshotCapture;
pub use loader::{StageLoadReport, StageLoader};
pub use store::SnapshotStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Point-in-time state capture for one stage boundary.
///
/// On disk the variable map is flattened into the top-level object, so a
/// stage file reads `{"stage": 2, "notificationCount": 40, ..., "markup":
/// "...", "captured_at": 12.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "stage")]
    pub stage_index: i64,
    #[serde(flatten)]
    pub variables: BTreeMap<String, Value>,
    pub markup: String,
    /// Offset since session start, for ordering and debugging only.
    pub captured_at: f64,
}

/// Per-session index of which stage snapshots exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub session_id: String,
    pub stages_captured: usize,
    pub stage_numbers: Vec<i64>,
}
