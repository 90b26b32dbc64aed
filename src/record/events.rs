//! Recording data model.
//!
//! The wire format matches the recording files the observer produces: tagged
//! event objects with `timestamp` offsets in seconds since session start.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Opaque identifier for one recording session, assigned at session start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("session_{}", Local::now().format("%Y%m%d_%H%M%S")))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observed interaction.
///
/// `timestamp` is the elapsed-seconds offset since session start. Offsets are
/// non-decreasing across a recording; near-simultaneous events may share an
/// offset and keep their relative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordedEvent {
    Click {
        /// Best-effort structural locator; absent when no stable id or class
        /// was resolvable at capture time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        x: f64,
        y: f64,
        timestamp: f64,
    },
    Scroll {
        #[serde(rename = "scrollX")]
        scroll_x: f64,
        #[serde(rename = "scrollY")]
        scroll_y: f64,
        timestamp: f64,
    },
    #[serde(rename = "keypress")]
    Key { key: String, timestamp: f64 },
    #[serde(rename = "mousemove")]
    Move { x: f64, y: f64, timestamp: f64 },
}

impl RecordedEvent {
    /// Elapsed seconds since session start.
    pub fn offset(&self) -> f64 {
        match self {
            RecordedEvent::Click { timestamp, .. }
            | RecordedEvent::Scroll { timestamp, .. }
            | RecordedEvent::Key { timestamp, .. }
            | RecordedEvent::Move { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordedEvent::Click { .. } => "click",
            RecordedEvent::Scroll { .. } => "scroll",
            RecordedEvent::Key { .. } => "key",
            RecordedEvent::Move { .. } => "move",
        }
    }
}

/// One completed capture session. `events` is append-only while recording and
/// immutable once persisted; its order is what replay correctness rests on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub session_id: SessionId,
    #[serde(rename = "timestamp")]
    pub started_at: DateTime<Local>,
    /// Document path or URL the session drove.
    pub html_path: String,
    /// Wall-clock seconds from navigation to save/close.
    pub duration_seconds: f64,
    pub events: Vec<RecordedEvent>,
}
