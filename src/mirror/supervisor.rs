use super::session::MirrorSession;
use super::{AggregateStatus, SessionState, SupervisorStatus};
use crate::utils::config::Config;
use crate::utils::mirror_log::MirrorLog;
use std::sync::Arc;
use tracing::{error, info};

/// Owns one [`MirrorSession`] per configured sync target and drives them
/// together.
#[derive(Clone)]
pub struct SessionSupervisor {
    sessions: Arc<Vec<MirrorSession>>,
}

impl SessionSupervisor {
    /// Build a session for every target in the configuration.
    pub fn new(config: &Config, log: MirrorLog) -> Self {
        let sessions = config
            .targets
            .iter()
            .map(|target| MirrorSession::new(target.clone(), log.clone()))
            .collect();
        Self {
            sessions: Arc::new(sessions),
        }
    }

    pub fn sessions(&self) -> &[MirrorSession] {
        &self.sessions
    }

    /// Start every session. A session that fails to establish its watch is
    /// logged and left idle; the others are unaffected.
    pub fn start_all(&self) {
        info!("starting {} mirror session(s)", self.sessions.len());
        for session in self.sessions.iter() {
            if let Err(err) = session.start() {
                error!(
                    target_name = %session.target().name,
                    error = %err,
                    "session failed to start"
                );
            }
        }
    }

    /// Stop every session, waiting for each to wind down its in-flight work.
    pub async fn stop_all(&self) {
        info!("stopping {} mirror session(s)", self.sessions.len());
        futures::future::join_all(self.sessions.iter().map(|session| session.stop())).await;
    }

    /// Aggregate state: syncing if any session has running work, else idle if
    /// any session is watching, else stopped.
    pub fn aggregate(&self) -> AggregateStatus {
        if self.sessions.iter().any(|s| s.have_active_tasks()) {
            AggregateStatus::Syncing
        } else if self
            .sessions
            .iter()
            .any(|s| s.state() == SessionState::Watching)
        {
            AggregateStatus::Idle
        } else {
            AggregateStatus::Stopped
        }
    }

    /// Snapshot of the supervisor and all sessions, for the display layer.
    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            aggregate: self.aggregate(),
            sessions: self.sessions.iter().map(|s| s.status()).collect(),
        }
    }
}
