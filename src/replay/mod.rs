//! Timed session replay.
//!
//! Re-dispatches a recording's events against a page, preserving the captured
//! inter-event delays scaled by a speed factor. Replay is strictly sequential:
//! one dispatch completes before the next wait begins, and cancellation is
//! checked only at event boundaries.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::driver::{DriverError, PageDriver};
use crate::error::EngineError;
use crate::record::{RecordedEvent, Recording};

/// Clears every interval and timeout timer in the page, so the application
/// holds its end-of-replay state for inspection.
const FREEZE_SCRIPT: &str =
    "for (let i = 1; i < 99999; i++) { window.clearInterval(i); window.clearTimeout(i); }";

/// Outcome of one replay run, reported whether or not individual dispatches
/// failed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub events_total: usize,
    pub dispatched: usize,
    /// Events that could not be applied at all; replay continued past them.
    pub failed: usize,
    /// Clicks whose selector no longer resolved and fell back to coordinates.
    pub fallbacks: usize,
    pub wall_clock: Duration,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct SessionReplayer;

impl SessionReplayer {
    pub fn new() -> Self {
        Self
    }

    /// Replay `recording` against `driver` at `speed`.
    ///
    /// `speed` must be positive: 2.0 halves every delay, 0.5 doubles it.
    /// Events are scheduled against the replay clock rather than the previous
    /// dispatch, so jitter does not accumulate across long recordings; the
    /// gap between consecutive dispatches is the captured offset delta
    /// divided by `speed`.
    pub async fn replay(
        &self,
        recording: &Recording,
        driver: &Arc<dyn PageDriver>,
        speed: f64,
        cancel: &CancellationToken,
    ) -> Result<ReplaySummary, EngineError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "replay speed must be positive, got {speed}"
            )));
        }

        let start = Instant::now();
        let mut summary = ReplaySummary {
            events_total: recording.events.len(),
            dispatched: 0,
            failed: 0,
            fallbacks: 0,
            wall_clock: Duration::ZERO,
            cancelled: false,
        };

        for (index, event) in recording.events.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let due = Duration::from_secs_f64(event.offset() / speed);
            let elapsed = start.elapsed();
            if due > elapsed {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(due - elapsed) => {}
                }
            }

            match self.dispatch(driver, event, &mut summary).await {
                Ok(()) => summary.dispatched += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(
                        event = index + 1,
                        kind = event.kind(),
                        error = %err,
                        "event dispatch failed; continuing with remaining events"
                    );
                }
            }
        }

        summary.wall_clock = start.elapsed();
        tracing::info!(
            session = %recording.session_id,
            dispatched = summary.dispatched,
            failed = summary.failed,
            cancelled = summary.cancelled,
            wall_clock_secs = summary.wall_clock.as_secs_f64(),
            "replay finished"
        );
        Ok(summary)
    }

    async fn dispatch(
        &self,
        driver: &Arc<dyn PageDriver>,
        event: &RecordedEvent,
        summary: &mut ReplaySummary,
    ) -> Result<(), DriverError> {
        match event {
            RecordedEvent::Click {
                selector: Some(selector),
                x,
                y,
                ..
            } => match driver.dispatch_click_selector(selector).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    // Selector drift is expected when replaying against a
                    // modified page; degrade to the recorded coordinates.
                    summary.fallbacks += 1;
                    tracing::warn!(
                        selector = %selector,
                        error = %err,
                        "selector did not resolve; falling back to coordinates"
                    );
                    driver.dispatch_click_at(*x, *y).await
                }
            },
            RecordedEvent::Click {
                selector: None,
                x,
                y,
                ..
            } => driver.dispatch_click_at(*x, *y).await,
            RecordedEvent::Scroll {
                scroll_x, scroll_y, ..
            } => driver.dispatch_scroll(*scroll_x, *scroll_y).await,
            RecordedEvent::Key { key, .. } => driver.dispatch_key(key).await,
            RecordedEvent::Move { x, y, .. } => driver.dispatch_move(*x, *y).await,
        }
    }

    /// Stop all page timers after a completed replay.
    pub async fn freeze_page(&self, driver: &Arc<dyn PageDriver>) -> Result<(), DriverError> {
        driver.evaluate(FREEZE_SCRIPT).await.map(|_| ())
    }
}
