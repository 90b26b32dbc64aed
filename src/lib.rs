pub mod driver;
pub mod error;
pub mod profile;
pub mod record;
pub mod replay;
pub mod snapshot;
pub mod util;

pub use driver::{
    ChromiumDriver, DriverAction, DriverError, MockPageDriver, PageDriver, StateObservation,
    StateProbe,
};
pub use error::EngineError;
pub use profile::{AppProfile, StageDescriptor};
pub use record::{
    EventCapture, EventStore, RecordedEvent, Recording, RecordingOptions, RecordingSession,
    RecordingSummary, SessionId,
};
pub use replay::{ReplaySummary, SessionReplayer};
pub use snapshot::{
    Snapshot, SnapshotCapture, SnapshotMetadata, SnapshotStore, StageLoadReport, StageLoader,
};
