//! Durable store for stage snapshots.
//!
//! Layout: `<root>/<session_id>/stage_<n>.json` plus a per-session
//! `metadata.json` enumerating the captured stage indices. Metadata is
//! rebuilt from the stage files on every persist so the two can never
//! disagree.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::NamedTempFile;

use crate::error::EngineError;
use crate::record::SessionId;
use crate::snapshot::{Snapshot, SnapshotMetadata};

const METADATA_FILE: &str = "metadata.json";

fn stage_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^stage_(-?\d+)\.json$").expect("valid regex"))
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    fn stage_path(&self, session: &SessionId, stage: i64) -> PathBuf {
        self.session_dir(session).join(format!("stage_{stage}.json"))
    }

    /// Write a snapshot atomically. Persisting the same stage index again
    /// overwrites the earlier capture; last write wins.
    pub fn persist(&self, session: &SessionId, snapshot: &Snapshot) -> Result<PathBuf, EngineError> {
        let dir = self.session_dir(session);
        fs::create_dir_all(&dir).map_err(EngineError::Persistence)?;

        let path = self.stage_path(session, snapshot.stage_index);
        write_json(&dir, &path, &serde_json::to_string_pretty(snapshot)?)?;
        self.rewrite_metadata(session)?;
        Ok(path)
    }

    pub fn load(&self, session: &SessionId, stage: i64) -> Result<Snapshot, EngineError> {
        let path = self.stage_path(session, stage);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SnapshotNotFound {
                    session: session.to_string(),
                    stage,
                })
            }
            Err(e) => return Err(EngineError::Persistence(e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Captured stage indices for a session, sorted ascending. A session with
    /// no snapshots yields an empty list.
    pub fn stage_numbers(&self, session: &SessionId) -> Result<Vec<i64>, EngineError> {
        let entries = match fs::read_dir(self.session_dir(session)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::Persistence(e)),
        };

        let mut numbers: Vec<i64> = entries
            .filter_map(|entry| {
                let name = entry.ok()?.file_name();
                let captures = stage_file_pattern().captures(name.to_str()?)?;
                captures[1].parse().ok()
            })
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Session ids with at least one captured stage.
    pub fn sessions(&self) -> Result<Vec<SessionId>, EngineError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::Persistence(e)),
        };

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let id = SessionId::from_string(name);
            if !self.stage_numbers(&id)?.is_empty() {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    pub fn metadata(&self, session: &SessionId) -> Result<SnapshotMetadata, EngineError> {
        let path = self.session_dir(session).join(METADATA_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // No metadata file yet; derive the index from the stage files.
                let stage_numbers = self.stage_numbers(session)?;
                Ok(SnapshotMetadata {
                    session_id: session.to_string(),
                    stages_captured: stage_numbers.len(),
                    stage_numbers,
                })
            }
            Err(e) => Err(EngineError::Persistence(e)),
        }
    }

    fn rewrite_metadata(&self, session: &SessionId) -> Result<(), EngineError> {
        let stage_numbers = self.stage_numbers(session)?;
        let metadata = SnapshotMetadata {
            session_id: session.to_string(),
            stages_captured: stage_numbers.len(),
            stage_numbers,
        };
        let dir = self.session_dir(session);
        let path = dir.join(METADATA_FILE);
        write_json(&dir, &path, &serde_json::to_string_pretty(&metadata)?)
    }
}

fn write_json(dir: &Path, path: &Path, json: &str) -> Result<(), EngineError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(EngineError::Persistence)?;
    tmp.write_all(json.as_bytes())
        .map_err(EngineError::Persistence)?;
    tmp.persist(path)
        .map_err(|e| EngineError::Persistence(e.error))?;
    Ok(())
}
