//! Chromium-backed page driver.
//!
//! Drives the page through script evaluation over the DevTools protocol. All
//! synthetic input is dispatched in-page (element `click()`, constructed
//! `KeyboardEvent`s, `scrollTo`), which keeps the dispatch path identical for
//! recorded and restored pages.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{DriverError, PageDriver, StateObservation, StateProbe};

pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page context.
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Close the page and shut the browser down.
    pub async fn close(mut self) -> Result<(), DriverError> {
        let result = self.browser.close().await;
        self.handler_task.abort();
        result?;
        Ok(())
    }

    async fn eval(&self, script: &str) -> Result<Value, DriverError> {
        let result = self.page.evaluate(script.to_string()).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn add_init_script(&self, script: &str) -> Result<(), DriverError> {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(script)
            .build()
            .map_err(DriverError::Evaluate)?;
        self.page.evaluate_on_new_document(params).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.eval(script).await
    }

    async fn set_variable(&self, name: &str, value: &Value) -> Result<(), DriverError> {
        if !is_identifier(name) {
            return Err(DriverError::Inject(format!(
                "not a scriptable variable name: {name}"
            )));
        }
        let literal =
            serde_json::to_string(value).map_err(|e| DriverError::Inject(e.to_string()))?;
        self.eval(&format!("{name} = {literal}; true")).await?;
        Ok(())
    }

    async fn dispatch_click_selector(&self, selector: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::SelectorUnresolved(selector.to_string()))?;
        element.click().await?;
        Ok(())
    }

    async fn dispatch_click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.elementFromPoint({x}, {y}); \
             if (!el) return false; el.click(); return true; }})()"
        );
        let value = self.eval(&script).await?;
        if value.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::Evaluate(format!(
                "no element at ({x}, {y})"
            )))
        }
    }

    async fn dispatch_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let script = format!(
            "document.dispatchEvent(new MouseEvent('mousemove', \
             {{ clientX: {x}, clientY: {y}, bubbles: true }})); true"
        );
        self.eval(&script).await?;
        Ok(())
    }

    async fn dispatch_scroll(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.eval(&format!("window.scrollTo({x}, {y}); true")).await?;
        Ok(())
    }

    async fn dispatch_key(&self, key: &str) -> Result<(), DriverError> {
        let literal =
            serde_json::to_string(key).map_err(|e| DriverError::Evaluate(e.to_string()))?;
        let script = format!(
            "(() => {{ const ev = new KeyboardEvent('keydown', \
             {{ key: {literal}, bubbles: true, cancelable: true }}); \
             (document.activeElement || document).dispatchEvent(ev); return true; }})()"
        );
        self.eval(&script).await?;
        Ok(())
    }

    async fn markup(&self, selector: &str) -> Result<String, DriverError> {
        let literal =
            serde_json::to_string(selector).map_err(|e| DriverError::Evaluate(e.to_string()))?;
        let script = format!(
            "(() => {{ const el = document.querySelector({literal}); \
             return el ? el.innerHTML : null; }})()"
        );
        match self.eval(&script).await? {
            Value::String(html) => Ok(html),
            _ => Err(DriverError::SelectorUnresolved(selector.to_string())),
        }
    }

    async fn observe_state(&self, probe: &StateProbe) -> Result<StateObservation, DriverError> {
        let raw = self.eval(&observation_script(probe)).await?;
        let Value::String(json) = raw else {
            return Err(DriverError::Evaluate(
                "state observation returned no payload".to_string(),
            ));
        };
        serde_json::from_str(&json).map_err(|e| DriverError::Evaluate(e.to_string()))
    }

    async fn is_open(&self) -> bool {
        self.page.evaluate("1".to_string()).await.is_ok()
    }
}

/// Build the single-evaluation observation script for a probe. Stage,
/// variables, and markup are read in one script so no dispatch can interleave
/// between them.
fn observation_script(probe: &StateProbe) -> String {
    let mut reads = String::new();
    for name in probe.variables.iter().filter(|n| is_identifier(n)) {
        let key = serde_json::to_string(name).unwrap_or_default();
        reads.push_str(&format!(
            "try {{ const v = (typeof {name} !== 'undefined') ? {name} : null; \
             if (v !== null) vars[{key}] = v; }} catch (e) {{}}\n"
        ));
    }

    let stage_var = &probe.stage_variable;
    let stage_read = if is_identifier(stage_var) {
        format!(
            "try {{ if (typeof {stage_var} === 'number') stage = Math.trunc({stage_var}); }} catch (e) {{}}"
        )
    } else {
        String::new()
    };

    let selector = serde_json::to_string(&probe.content_selector).unwrap_or_default();
    format!(
        "(() => {{\n\
         const vars = {{}};\n\
         {reads}\
         let stage = -1;\n\
         {stage_read}\n\
         const region = document.querySelector({selector});\n\
         return JSON.stringify({{ stage: stage, variables: vars, markup: region ? region.innerHTML : '' }});\n\
         }})()"
    )
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
