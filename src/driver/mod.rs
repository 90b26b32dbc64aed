//! Page drivers.
//!
//! The engine never talks to a browser directly; everything goes through the
//! [`PageDriver`] trait, which models one live page context. `ChromiumDriver`
//! is the real implementation, `MockPageDriver` a scripted one for tests.

pub mod chromium;
pub mod mock;

pub use chromium::ChromiumDriver;
pub use mock::{DriverAction, MockPageDriver};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("page context is closed")]
    PageClosed,

    #[error("selector did not resolve: {0}")]
    SelectorUnresolved(String),

    #[error("script evaluation failed: {0}")]
    Evaluate(String),

    #[error("variable injection failed: {0}")]
    Inject(String),

    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// What a single state observation should read from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProbe {
    pub stage_variable: String,
    pub variables: Vec<String>,
    pub content_selector: String,
}

/// One atomic read of the target application's state: the stage discriminant,
/// the named variables, and the render region's markup, taken back-to-back
/// with no synthetic input dispatched in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateObservation {
    /// Current stage discriminant; -1 when the page does not expose one yet.
    pub stage: i64,
    pub variables: BTreeMap<String, Value>,
    pub markup: String,
}

/// One live page context.
///
/// Implementations own the browser connection; the engine holds a driver only
/// for the duration of a single capture, replay, or restore operation.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Install a script evaluated at the start of every new document, before
    /// the page's own scripts run.
    async fn add_init_script(&self, script: &str) -> Result<(), DriverError>;

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    /// Assign a script-visible variable in the page's execution context.
    async fn set_variable(&self, name: &str, value: &Value) -> Result<(), DriverError>;

    async fn dispatch_click_selector(&self, selector: &str) -> Result<(), DriverError>;

    async fn dispatch_click_at(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn dispatch_move(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn dispatch_scroll(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn dispatch_key(&self, key: &str) -> Result<(), DriverError>;

    /// Serialized inner markup of the first element matching `selector`.
    async fn markup(&self, selector: &str) -> Result<String, DriverError>;

    /// Atomically read the state described by `probe`.
    async fn observe_state(&self, probe: &StateProbe) -> Result<StateObservation, DriverError>;

    /// Whether the page context is still alive.
    async fn is_open(&self) -> bool;
}
