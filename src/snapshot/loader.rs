//! Stage isolation: restore a snapshot and hand control back to the app.
//!
//! Entering stage N directly means restoring the terminal state of stage
//! N − 1 (the snapshot indexed N − 1) into a freshly navigated page, then
//! invoking the application's own entry hook for stage N so its native
//! transition logic resumes ownership. No events are replayed.

use std::sync::Arc;

use serde_json::Value;

use crate::driver::{DriverError, PageDriver};
use crate::error::EngineError;
use crate::profile::AppProfile;
use crate::record::SessionId;
use crate::snapshot::SnapshotStore;

/// What a stage restore actually accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct StageLoadReport {
    pub target_stage: i64,
    /// Stage index of the snapshot consumed (`target_stage - 1`).
    pub restored_stage: i64,
    /// Variables injected successfully, the discriminant included.
    pub injected: usize,
    /// Variables whose injection failed, by name.
    pub failed: Vec<String>,
    pub markup_restored: bool,
    pub entry_invoked: bool,
}

pub struct StageLoader {
    store: SnapshotStore,
    profile: AppProfile,
}

impl StageLoader {
    pub fn new(store: SnapshotStore, profile: AppProfile) -> Self {
        Self { store, profile }
    }

    /// Restore `session`'s state for entering `target_stage` on `driver`.
    ///
    /// Fails with NotFound before touching the page when the predecessor
    /// snapshot is missing. Injection is best-effort: every variable is
    /// attempted, failures are reported, and the entry hook is still invoked,
    /// since a partial restoration beats none for iterative debugging.
    pub async fn load_stage(
        &self,
        session: &SessionId,
        target_stage: i64,
        driver: &Arc<dyn PageDriver>,
    ) -> Result<StageLoadReport, EngineError> {
        let restored_stage = target_stage - 1;
        let snapshot = self.store.load(session, restored_stage)?;

        let mut injected = 0usize;
        let mut failed = Vec::new();

        let stage_value = Value::from(snapshot.stage_index);
        match driver
            .set_variable(&self.profile.stage_variable, &stage_value)
            .await
        {
            Ok(()) => injected += 1,
            Err(err) => {
                tracing::warn!(
                    variable = %self.profile.stage_variable,
                    error = %err,
                    "variable injection failed"
                );
                failed.push(self.profile.stage_variable.clone());
            }
        }

        for (name, value) in &snapshot.variables {
            match driver.set_variable(name, value).await {
                Ok(()) => injected += 1,
                Err(err) => {
                    tracing::warn!(variable = %name, error = %err, "variable injection failed");
                    failed.push(name.clone());
                }
            }
        }

        let markup_restored = match self.restore_markup(driver, &snapshot.markup).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "markup restore failed");
                false
            }
        };

        let entry_invoked = match self.profile.entry_script(target_stage) {
            Some(script) => match driver.evaluate(script).await {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!(stage = target_stage, error = %err, "stage entry hook failed");
                    false
                }
            },
            None => {
                tracing::debug!(stage = target_stage, "no entry hook configured for stage");
                false
            }
        };

        tracing::info!(
            session = %session,
            stage = target_stage,
            injected,
            failed = failed.len(),
            "stage restored"
        );

        Ok(StageLoadReport {
            target_stage,
            restored_stage,
            injected,
            failed,
            markup_restored,
            entry_invoked,
        })
    }

    async fn restore_markup(
        &self,
        driver: &Arc<dyn PageDriver>,
        markup: &str,
    ) -> Result<(), DriverError> {
        let selector = serde_json::to_string(&self.profile.content_selector)
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        let html =
            serde_json::to_string(markup).map_err(|e| DriverError::Evaluate(e.to_string()))?;
        let script = format!(
            "(() => {{ const region = document.querySelector({selector}); \
             if (!region) return false; region.innerHTML = {html}; return true; }})()"
        );
        let value = driver.evaluate(&script).await?;
        if value.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::SelectorUnresolved(
                self.profile.content_selector.clone(),
            ))
        }
    }
}
