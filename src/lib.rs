//! # smartsync - Real-time One-Way Folder Mirroring
//!
//! Watches a set of source directories and continuously replicates file and
//! folder changes into mirrored destination trees, including a reconciliation
//! pass on every (re)start.

pub mod mirror;
pub mod utils;

// Re-export commonly used types
pub use mirror::{
    AggregateStatus, MirrorError, MirrorEvent, MirrorSession, SessionState, SessionStatus,
    SessionSupervisor, SupervisorStatus, SyncTarget,
};
pub use utils::config::Config;
pub use utils::mirror_log::MirrorLog;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
