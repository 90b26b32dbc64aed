//! Durable store for recordings, one JSON file per session.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::EngineError;
use crate::record::events::{Recording, SessionId};

/// Directory-backed store keyed by session id.
#[derive(Debug, Clone)]
pub struct EventStore {
    root: PathBuf,
}

impl EventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{}.json", id.as_str()))
    }

    /// Write the full recording atomically. Re-saving an existing session id
    /// overwrites its record.
    pub fn persist(&self, recording: &Recording) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.root).map_err(EngineError::Persistence)?;
        let path = self.path_for(&recording.session_id);
        let json = serde_json::to_string_pretty(recording)?;

        // Write to a sibling temp file and rename so a failed write never
        // leaves a partial record under the session's name.
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(EngineError::Persistence)?;
        tmp.write_all(json.as_bytes())
            .map_err(EngineError::Persistence)?;
        tmp.persist(&path)
            .map_err(|e| EngineError::Persistence(e.error))?;
        Ok(path)
    }

    pub fn load(&self, id: &SessionId) -> Result<Recording, EngineError> {
        let path = self.path_for(id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SessionNotFound(id.to_string()))
            }
            Err(e) => return Err(EngineError::Persistence(e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Known session ids, sorted. The sequence is finite and restartable:
    /// call again for a fresh view.
    pub fn list(&self) -> Result<Vec<SessionId>, EngineError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::Persistence(e)),
        };

        let mut ids: Vec<SessionId> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                if path.extension()?.to_str()? != "json" {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                Some(SessionId::from_string(stem))
            })
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}
