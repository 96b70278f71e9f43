//! Host-owned collaborators handed to the orchestrator

use std::fmt;
use std::path::{Path, PathBuf};

use super::identifiers::AgentSessionId;
use super::messages::Message;

/// Working directory a session runs in
///
/// The host owns the context (a checkout, a worktree, a scratch dir); the
/// engine only keeps a shared reference and reads its root.
pub trait WorkingContext: Send + Sync + fmt::Debug {
    /// Directory the agent process is started in
    fn root(&self) -> &Path;
}

impl WorkingContext for PathBuf {
    fn root(&self) -> &Path {
        self
    }
}

/// Previously recorded conversation used to seed an idle session
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    /// Agent session to resume when the first turn is sent
    pub agent_session_id: Option<AgentSessionId>,
    /// Messages shown as the session's existing transcript
    pub messages: Vec<Message>,
}

impl SessionHistory {
    /// History for a known agent session
    pub fn new(agent_session_id: impl Into<AgentSessionId>, messages: Vec<Message>) -> Self {
        Self {
            agent_session_id: Some(agent_session_id.into()),
            messages,
        }
    }
}
