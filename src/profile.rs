//! Target-application profiles.
//!
//! A profile describes the application under test: which script-visible
//! variables make up its state, which variable discriminates stages, where it
//! renders, and how to hand control back to it at a given stage. Profiles are
//! configuration owned by the target application; the engine consumes them
//! read-only.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::driver::StateProbe;
use crate::error::EngineError;

/// One stage of the target application's behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Script expression that resumes the application's own logic at this
    /// stage, e.g. `enterStage(3)`. Absent means the app picks up from the
    /// restored state on its own.
    #[serde(default)]
    pub entry: Option<String>,
}

/// State description for one target application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProfile {
    /// Script-visible variable names captured in snapshots.
    pub variables: Vec<String>,
    /// The variable whose value discriminates stages.
    pub stage_variable: String,
    /// CSS selector of the region the application renders into.
    pub content_selector: String,
    #[serde(default)]
    pub stages: BTreeMap<i64, StageDescriptor>,
}

impl AppProfile {
    /// Load a profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path).map_err(EngineError::Persistence)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The observation probe derived from this profile.
    pub fn probe(&self) -> StateProbe {
        StateProbe {
            stage_variable: self.stage_variable.clone(),
            variables: self.variables.clone(),
            content_selector: self.content_selector.clone(),
        }
    }

    pub fn stage(&self, index: i64) -> Option<&StageDescriptor> {
        self.stages.get(&index)
    }

    /// Human label for a stage, falling back to the bare index.
    pub fn stage_name(&self, index: i64) -> String {
        self.stage(index)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("stage {index}"))
    }

    pub fn entry_script(&self, index: i64) -> Option<&str> {
        self.stage(index).and_then(|s| s.entry.as_deref())
    }
}
