pub mod copier;
pub mod error;
pub mod operation;
pub mod replicator;
pub mod session;
pub mod supervisor;
pub mod translate;
pub mod watch;

pub use error::MirrorError;
pub use operation::{OperationId, OperationState};
pub use replicator::ReplicationStats;
pub use session::MirrorSession;
pub use supervisor::SessionSupervisor;
pub use translate::PathTranslator;
pub use watch::MirrorEvent;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A named source/destination directory pair kept in sync.
///
/// The destination is conventionally derived as `<sync_root>/<name>`. Targets
/// are owned by the configuration collection and read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl SyncTarget {
    /// Create a target mirroring `source` into `<sync_root>/<name>`.
    ///
    /// A missing source directory is reported but not fatal; the session for
    /// this target will fail to establish its watch until the path exists.
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, sync_root: &Path) -> Self {
        let name = name.into();
        let source = source.into();
        if !source.is_dir() {
            warn!(
                target_name = %name,
                source = %source.display(),
                "source directory not found"
            );
        }
        let destination = sync_root.join(&name);
        Self {
            name,
            source,
            destination,
        }
    }

    /// Create a target with an explicit destination path.
    pub fn with_destination(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        let source = source.into();
        if !source.is_dir() {
            warn!(
                target_name = %name,
                source = %source.display(),
                "source directory not found"
            );
        }
        Self {
            name,
            source,
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Watching,
    Stopping,
}

/// Snapshot of a single session, for status display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub name: String,
    pub state: SessionState,
    pub active_operations: usize,
    pub watch_enabled: bool,
}

/// Aggregate state across all sessions.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Syncing,
    Idle,
    Stopped,
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateStatus::Syncing => write!(f, "syncing"),
            AggregateStatus::Idle => write!(f, "idle"),
            AggregateStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of the supervisor and every session under it.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub aggregate: AggregateStatus,
    pub sessions: Vec<SessionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_destination_is_derived_from_name() {
        let target = SyncTarget::new("photos", "/tmp", Path::new("/mirror"));
        assert_eq!(target.destination, PathBuf::from("/mirror/photos"));
    }

    #[test]
    fn missing_source_still_creates_target() {
        let target = SyncTarget::new("gone", "/no/such/dir", Path::new("/mirror"));
        assert_eq!(target.source, PathBuf::from("/no/such/dir"));
        assert_eq!(target.destination, PathBuf::from("/mirror/gone"));
    }

    #[test]
    fn aggregate_status_displays_lowercase() {
        assert_eq!(AggregateStatus::Syncing.to_string(), "syncing");
        assert_eq!(AggregateStatus::Idle.to_string(), "idle");
        assert_eq!(AggregateStatus::Stopped.to_string(), "stopped");
    }
}
