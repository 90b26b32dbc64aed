//! Session recording.
//!
//! [`RecordingSession`] runs one capture end-to-end: install the interaction
//! observer, navigate, drain events (and optionally poll for stage
//! snapshots) until a save trigger fires, then persist the recording.

pub mod capture;
pub mod events;
pub mod store;

pub use capture::EventCapture;
pub use events::{RecordedEvent, Recording, SessionId};
pub use store::EventStore;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::driver::PageDriver;
use crate::error::EngineError;
use crate::profile::AppProfile;
use crate::snapshot::{SnapshotCapture, SnapshotStore};
use crate::util;

#[derive(Debug, Clone)]
pub struct RecordingOptions {
    /// How often buffered page events become durable.
    pub drain_interval: Duration,
    /// How often the stage discriminant is polled.
    pub snapshot_interval: Duration,
    pub capture_snapshots: bool,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(500),
            snapshot_interval: Duration::from_millis(500),
            capture_snapshots: false,
        }
    }
}

/// What one recording run produced.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub session_id: SessionId,
    pub duration_seconds: f64,
    pub event_count: usize,
    pub stages_captured: Vec<i64>,
    pub path: PathBuf,
}

pub struct RecordingSession {
    source: String,
    profile: Option<AppProfile>,
    events: EventStore,
    snapshots: SnapshotStore,
    options: RecordingOptions,
}

impl RecordingSession {
    pub fn new(source: impl Into<String>, events: EventStore, snapshots: SnapshotStore) -> Self {
        Self {
            source: source.into(),
            profile: None,
            events,
            snapshots,
            options: RecordingOptions::default(),
        }
    }

    pub fn with_profile(mut self, profile: AppProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_options(mut self, options: RecordingOptions) -> Self {
        self.options = options;
        self
    }

    /// Record one session on `driver` until the page requests a save, the
    /// context closes, or `cancel` fires. The recording is persisted before
    /// this returns; snapshots are persisted as their transitions happen.
    pub async fn record(
        &self,
        driver: Arc<dyn PageDriver>,
        cancel: &CancellationToken,
    ) -> Result<RecordingSummary, EngineError> {
        let session_id = SessionId::generate();
        let url = util::page_url(&self.source);

        driver.add_init_script(capture::OBSERVER_SCRIPT).await?;
        driver.navigate(&url).await?;

        let started_at = Local::now();
        let clock = Instant::now();

        let mut event_capture = EventCapture::with_drain_interval(self.options.drain_interval);
        event_capture.start(driver.clone());

        let mut snapshot_capture = match (&self.profile, self.options.capture_snapshots) {
            (Some(profile), true) => {
                let mut capture = SnapshotCapture::new(
                    profile.probe(),
                    self.snapshots.clone(),
                    self.options.snapshot_interval,
                );
                capture.start(driver.clone(), session_id.clone(), clock);
                Some(capture)
            }
            _ => None,
        };

        tokio::select! {
            _ = event_capture.wait_stopped() => {}
            _ = cancel.cancelled() => {
                tracing::info!(session = %session_id, "recording cancelled externally");
            }
        }

        let events = event_capture.stop().await;
        let stages_captured = match snapshot_capture.as_mut() {
            Some(capture) => capture.stop().await,
            None => Vec::new(),
        };

        let recording = Recording {
            session_id: session_id.clone(),
            started_at,
            html_path: self.source.clone(),
            duration_seconds: clock.elapsed().as_secs_f64(),
            events,
        };
        let path = self.events.persist(&recording)?;

        tracing::info!(
            session = %session_id,
            events = recording.events.len(),
            duration_secs = recording.duration_seconds,
            stages = stages_captured.len(),
            "recording persisted"
        );

        Ok(RecordingSummary {
            session_id,
            duration_seconds: recording.duration_seconds,
            event_count: recording.events.len(),
            stages_captured,
            path,
        })
    }
}
