//! Error taxonomy for the recording/replay/snapshot engine.

use crate::driver::DriverError;

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No recording exists for the requested session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No snapshot exists for the requested (session, stage) pair.
    #[error("no snapshot for stage {stage} in session {session}")]
    SnapshotNotFound { session: String, stage: i64 },

    /// A caller-supplied value was rejected before any side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single dispatch or injection could not be applied.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// A store write or read could not complete. Writes are all-or-nothing,
    /// so a failed persist leaves no partial record behind.
    #[error("persistence failure: {0}")]
    Persistence(#[source] std::io::Error),

    /// A persisted record exists but does not parse.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Page driver failure.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
