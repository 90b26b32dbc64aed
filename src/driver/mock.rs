//! Mock page driver for deterministic testing.
//!
//! Implements [`PageDriver`] without a browser: script evaluations answer
//! from queued responses, state observations from a queued sequence, and
//! every dispatched action is logged with its dispatch time for later
//! verification. Use this anywhere a test needs to drive the capture, replay,
//! or restore paths.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use super::{DriverError, PageDriver, StateObservation, StateProbe};

/// One call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverAction {
    Navigate(String),
    InitScript,
    Evaluate(String),
    SetVariable(String, Value),
    ClickSelector(String),
    ClickAt(f64, f64),
    MoveTo(f64, f64),
    Scroll(f64, f64),
    Key(String),
    Markup(String),
}

/// A logged action plus the instant it happened. Under a paused tokio clock
/// the instants are exact, which is what the replay timing tests rely on.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub action: DriverAction,
    pub at: Instant,
}

enum EvalResponse {
    Value(Value),
    /// Close the page and fail the evaluation.
    PageClosed,
}

#[derive(Default)]
struct MockState {
    actions: Vec<DispatchRecord>,
    eval_queues: HashMap<String, VecDeque<EvalResponse>>,
    eval_fallback: Option<Value>,
    observations: VecDeque<StateObservation>,
    last_observation: Option<StateObservation>,
    unresolvable_selectors: HashSet<String>,
    failing_variables: HashSet<String>,
    variables: BTreeMap<String, Value>,
    markup: HashMap<String, String>,
}

pub struct MockPageDriver {
    state: Mutex<MockState>,
    open: AtomicBool,
}

impl MockPageDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            open: AtomicBool::new(true),
        }
    }

    /// Queue the next response for an exact script. Responses are consumed in
    /// FIFO order; once the queue is empty the fallback (or `null`) answers.
    pub fn push_eval(&self, script: &str, value: Value) {
        self.state
            .lock()
            .eval_queues
            .entry(script.to_string())
            .or_default()
            .push_back(EvalResponse::Value(value));
    }

    /// Queue a response that closes the page mid-evaluation.
    pub fn push_eval_page_closed(&self, script: &str) {
        self.state
            .lock()
            .eval_queues
            .entry(script.to_string())
            .or_default()
            .push_back(EvalResponse::PageClosed);
    }

    /// Answer for any script without a queued response.
    pub fn set_eval_fallback(&self, value: Value) {
        self.state.lock().eval_fallback = Some(value);
    }

    /// Queue a state observation. Once the queue is empty the last
    /// observation repeats, mirroring a page whose state stopped changing.
    pub fn push_observation(&self, observation: StateObservation) {
        self.state.lock().observations.push_back(observation);
    }

    /// Make a selector fail to resolve.
    pub fn fail_selector(&self, selector: &str) {
        self.state
            .lock()
            .unresolvable_selectors
            .insert(selector.to_string());
    }

    /// Make injection of a named variable fail.
    pub fn fail_variable(&self, name: &str) {
        self.state.lock().failing_variables.insert(name.to_string());
    }

    pub fn set_markup(&self, selector: &str, html: &str) {
        self.state
            .lock()
            .markup
            .insert(selector.to_string(), html.to_string());
    }

    /// Close the page context; subsequent calls fail with `PageClosed`.
    pub fn close_page(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Every call observed so far, in order.
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.state.lock().actions.clone()
    }

    /// Observed actions without their timing.
    pub fn actions(&self) -> Vec<DriverAction> {
        self.state
            .lock()
            .actions
            .iter()
            .map(|r| r.action.clone())
            .collect()
    }

    /// Variables injected via `set_variable`, latest value per name.
    pub fn injected_variables(&self) -> BTreeMap<String, Value> {
        self.state.lock().variables.clone()
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::PageClosed)
        }
    }

    fn log(&self, action: DriverAction) {
        self.state.lock().actions.push(DispatchRecord {
            action,
            at: Instant::now(),
        });
    }
}

impl Default for MockPageDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for MockPageDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::Navigate(url.to_string()));
        Ok(())
    }

    async fn add_init_script(&self, _script: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::InitScript);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::Evaluate(script.to_string()));
        let mut state = self.state.lock();
        if let Some(queue) = state.eval_queues.get_mut(script) {
            if let Some(response) = queue.pop_front() {
                return match response {
                    EvalResponse::Value(value) => Ok(value),
                    EvalResponse::PageClosed => {
                        drop(state);
                        self.close_page();
                        Err(DriverError::PageClosed)
                    }
                };
            }
        }
        Ok(state.eval_fallback.clone().unwrap_or(Value::Null))
    }

    async fn set_variable(&self, name: &str, value: &Value) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::SetVariable(name.to_string(), value.clone()));
        let mut state = self.state.lock();
        if state.failing_variables.contains(name) {
            return Err(DriverError::Inject(name.to_string()));
        }
        state.variables.insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn dispatch_click_selector(&self, selector: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::ClickSelector(selector.to_string()));
        if self.state.lock().unresolvable_selectors.contains(selector) {
            return Err(DriverError::SelectorUnresolved(selector.to_string()));
        }
        Ok(())
    }

    async fn dispatch_click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::ClickAt(x, y));
        Ok(())
    }

    async fn dispatch_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::MoveTo(x, y));
        Ok(())
    }

    async fn dispatch_scroll(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::Scroll(x, y));
        Ok(())
    }

    async fn dispatch_key(&self, key: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::Key(key.to_string()));
        Ok(())
    }

    async fn markup(&self, selector: &str) -> Result<String, DriverError> {
        self.ensure_open()?;
        self.log(DriverAction::Markup(selector.to_string()));
        self.state
            .lock()
            .markup
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::SelectorUnresolved(selector.to_string()))
    }

    async fn observe_state(&self, _probe: &StateProbe) -> Result<StateObservation, DriverError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if let Some(observation) = state.observations.pop_front() {
            state.last_observation = Some(observation.clone());
            return Ok(observation);
        }
        Ok(state.last_observation.clone().unwrap_or(StateObservation {
            stage: -1,
            variables: BTreeMap::new(),
            markup: String::new(),
        }))
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
