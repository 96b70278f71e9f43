//! Session information queries and subscriptions

use crate::error::Result;
use crate::types::identifiers::SessionId;

use super::super::events::{EventMask, Subscription};
use super::super::helpers::extract_last_output_lines;
use super::super::session::SessionSnapshot;
use super::core::SessionOrchestrator;

impl SessionOrchestrator {
    /// Snapshot of one session
    ///
    /// # Errors
    /// Returns `AgentError::SessionNotFound` for an unknown id
    pub fn get_session(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        Ok(self.entry(session_id)?.snapshot())
    }

    /// Snapshots of every session that has not reached a terminal state
    #[must_use]
    pub fn list_active(&self) -> Vec<SessionSnapshot> {
        self.list_sessions()
            .into_iter()
            .filter(|s| !s.state.is_terminal())
            .collect()
    }

    /// Snapshots of every registered session, oldest first
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .inner
            .registry
            .read()
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Last `n` lines of agent output for a session
    ///
    /// # Errors
    /// Returns `AgentError::SessionNotFound` for an unknown id
    pub fn last_output(&self, session_id: &SessionId, n: usize) -> Result<Vec<String>> {
        let entry = self.entry(session_id)?;
        let tracked = entry.tracked.read();
        Ok(extract_last_output_lines(&tracked.session.messages, n))
    }

    /// Whether a session's agent process is alive
    ///
    /// # Errors
    /// Returns `AgentError::SessionNotFound` for an unknown id
    pub async fn process_running(&self, session_id: &SessionId) -> Result<bool> {
        let query = self.entry(session_id)?.query();
        Ok(match query {
            Some(query) => query.is_running().await,
            None => false,
        })
    }

    /// Subscribe to the events selected by `mask`
    ///
    /// Dropping the subscription unsubscribes.
    #[must_use]
    pub fn subscribe(&self, mask: EventMask) -> Subscription {
        self.inner.events.subscribe(mask)
    }

    /// Explicitly end a subscription
    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.unsubscribe();
    }
}
