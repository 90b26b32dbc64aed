//! In-page interaction observation.
//!
//! An observer script buffers interaction events inside the page; a periodic
//! drain task moves them into the process-side buffer. Events become durable
//! only once a drain has picked them up: if the page context dies between
//! drains, the final in-flight batch is lost. That window is bounded by the
//! drain interval and accepted; it is not an error condition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::driver::PageDriver;
use crate::record::events::RecordedEvent;

/// Observer installed into the page before navigation.
///
/// Clicks record a best-effort selector (id, then classes, then tag name)
/// plus viewport coordinates; scrolls settle through a trailing timeout;
/// mouse moves are throttled to one capture per 100 ms to bound recording
/// size. Ctrl+S / Cmd+S raises the save flag instead of being recorded.
pub const OBSERVER_SCRIPT: &str = r#"
window.__encoreEvents = [];
window.__encoreStop = false;
(() => {
    const startTime = Date.now();
    const offset = () => (Date.now() - startTime) / 1000;

    const selectorFor = (element) => {
        if (!element || !element.tagName) return '';
        if (element.id) return '#' + element.id;
        if (element.className && typeof element.className === 'string') {
            const classes = element.className.split(' ').filter(c => c);
            if (classes.length > 0) return '.' + classes.join('.');
        }
        return element.tagName.toLowerCase();
    };

    document.addEventListener('keydown', (e) => {
        if ((e.ctrlKey || e.metaKey) && e.key === 's') {
            e.preventDefault();
            window.__encoreStop = true;
            return;
        }
        window.__encoreEvents.push({ type: 'keypress', key: e.key, timestamp: offset() });
    });

    document.addEventListener('click', (e) => {
        const selector = selectorFor(e.target);
        window.__encoreEvents.push({
            type: 'click',
            selector: selector || undefined,
            x: e.clientX,
            y: e.clientY,
            timestamp: offset()
        });
    }, true);

    let scrollTimer;
    window.addEventListener('scroll', () => {
        clearTimeout(scrollTimer);
        scrollTimer = setTimeout(() => {
            window.__encoreEvents.push({
                type: 'scroll',
                scrollX: window.scrollX,
                scrollY: window.scrollY,
                timestamp: offset()
            });
        }, 100);
    });

    let lastMove = 0;
    document.addEventListener('mousemove', (e) => {
        const now = Date.now();
        if (now - lastMove < 100) return;
        lastMove = now;
        window.__encoreEvents.push({ type: 'mousemove', x: e.clientX, y: e.clientY, timestamp: offset() });
    });
})();
"#;

/// Moves buffered events out of the page; what it returns is removed.
pub const DRAIN_SCRIPT: &str = "JSON.stringify((window.__encoreEvents || []).splice(0, (window.__encoreEvents || []).length))";

/// Reads the in-page save flag raised by Ctrl+S / Cmd+S.
pub const STOP_FLAG_SCRIPT: &str = "window.__encoreStop === true";

/// Observes a page context and accumulates its interaction events.
///
/// Purely observational: dispatches nothing, mutates no application state.
pub struct EventCapture {
    drain_interval: Duration,
    buffer: Arc<Mutex<Vec<RecordedEvent>>>,
    save_requested: Arc<AtomicBool>,
    page_closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    finished: CancellationToken,
    task: Option<JoinHandle<()>>,
    driver: Option<Arc<dyn PageDriver>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::with_drain_interval(Duration::from_millis(500))
    }

    pub fn with_drain_interval(drain_interval: Duration) -> Self {
        Self {
            drain_interval,
            buffer: Arc::new(Mutex::new(Vec::new())),
            save_requested: Arc::new(AtomicBool::new(false)),
            page_closed: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            task: None,
            driver: None,
        }
    }

    /// Begin observation: spawn the periodic drain task against `driver`.
    /// The observer script must already be installed in the page.
    pub fn start(&mut self, driver: Arc<dyn PageDriver>) {
        self.driver = Some(driver.clone());

        let buffer = self.buffer.clone();
        let save_requested = self.save_requested.clone();
        let page_closed = self.page_closed.clone();
        let cancel = self.cancel.clone();
        let finished = self.finished.clone();
        let drain_interval = self.drain_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(drain_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if drain_into(driver.as_ref(), &buffer).await.is_err() {
                    page_closed.store(true, Ordering::SeqCst);
                    finished.cancel();
                    break;
                }

                match driver.evaluate(STOP_FLAG_SCRIPT).await {
                    Ok(value) if value.as_bool() == Some(true) => {
                        save_requested.store(true, Ordering::SeqCst);
                        finished.cancel();
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => {
                        page_closed.store(true, Ordering::SeqCst);
                        finished.cancel();
                        break;
                    }
                }
            }
        });
        self.task = Some(task);
    }

    /// Resolves when a save trigger fires: the in-page save flag, or the
    /// page context going away.
    pub async fn wait_stopped(&self) {
        self.finished.cancelled().await;
    }

    /// Whether the page raised the save flag.
    pub fn save_requested(&self) -> bool {
        self.save_requested.load(Ordering::SeqCst)
    }

    /// Whether the page context terminated while observing.
    pub fn page_closed(&self) -> bool {
        self.page_closed.load(Ordering::SeqCst)
    }

    /// Stop observing, flush, and return the ordered event sequence.
    pub async fn stop(&mut self) -> Vec<RecordedEvent> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        // One final drain catches events observed after the last tick. If the
        // context is already gone there is nothing left to pull.
        if let Some(driver) = &self.driver {
            if !self.page_closed() && driver.is_open().await {
                let _ = drain_into(driver.as_ref(), &self.buffer).await;
            }
        }

        std::mem::take(&mut *self.buffer.lock())
    }
}

impl Default for EventCapture {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain_into(
    driver: &dyn PageDriver,
    buffer: &Mutex<Vec<RecordedEvent>>,
) -> Result<usize, crate::driver::DriverError> {
    let value = driver.evaluate(DRAIN_SCRIPT).await?;
    let batch = parse_batch(value);
    let drained = batch.len();
    if drained > 0 {
        buffer.lock().extend(batch);
    }
    Ok(drained)
}

/// Decode one drained batch. The real driver returns a JSON string, the mock
/// may answer with an array directly; anything unrecognized is dropped.
fn parse_batch(value: Value) -> Vec<RecordedEvent> {
    let value = match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Null),
        other => other,
    };
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::debug!(error = %err, "dropping unrecognized captured event");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
