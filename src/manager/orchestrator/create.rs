//! Session creation
//!
//! Eager sessions start a one-shot turn right away; idle sessions start a
//! streaming agent and wait for the host's first turn.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::query::Query;
use crate::transport::PromptInput;
use crate::types::context::{SessionHistory, WorkingContext};
use crate::types::identifiers::SessionId;
use crate::types::options::AgentOptions;

use super::super::events::SessionEvent;
use super::super::session::{Session, SessionEntry, SessionState};
use super::core::SessionOrchestrator;

impl SessionOrchestrator {
    /// Create a session and run its first turn immediately
    ///
    /// The session starts in `Starting` with a one-shot agent; its read loop
    /// moves it to `Active` on `init` and to a terminal state on `result`.
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the agent cannot be started or
    /// the orchestrator is shut down; nothing is registered in that case.
    pub async fn create_session(
        &self,
        context: Arc<dyn WorkingContext>,
        prompt: impl Into<String>,
        overrides: Option<AgentOptions>,
    ) -> Result<SessionId> {
        let prompt = prompt.into();
        let options = self.launch_options(context.as_ref(), overrides);
        let query = self
            .launch(PromptInput::String(prompt.clone()), options)
            .await?;

        let session_id = SessionId::generate();
        let session = Session::new(
            session_id.clone(),
            context,
            SessionState::Starting,
            Some(prompt),
        );
        let entry = Arc::new(SessionEntry::new(session));

        let _guard = entry.op_lock.lock().await;
        if let Err(e) = self.register(&entry) {
            discard(query).await;
            return Err(e);
        }
        self.bind(&entry, query, SessionState::Starting, true);
        log::info!("[{session_id}] Session created");

        Ok(session_id)
    }

    /// Create a session that waits for its first turn
    ///
    /// A streaming agent is started right away. With a history, its messages
    /// become the transcript and its agent session id is resumed.
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the agent cannot be started or
    /// the orchestrator is shut down; nothing is registered in that case.
    pub async fn create_idle_session(
        &self,
        context: Arc<dyn WorkingContext>,
        history: Option<SessionHistory>,
    ) -> Result<SessionId> {
        let history = history.unwrap_or_default();
        let mut options = self.launch_options(context.as_ref(), None);
        options.resume.clone_from(&history.agent_session_id);
        let query = self.launch(PromptInput::idle(), options).await?;

        let session_id = SessionId::generate();
        let mut session = Session::new(
            session_id.clone(),
            context,
            SessionState::WaitingForInput,
            None,
        );
        session.agent_session_id = history.agent_session_id;
        session.messages = history.messages;
        let entry = Arc::new(SessionEntry::new(session));

        let _guard = entry.op_lock.lock().await;
        if let Err(e) = self.register(&entry) {
            discard(query).await;
            return Err(e);
        }
        self.bind(&entry, query, SessionState::WaitingForInput, false);
        log::info!("[{session_id}] Idle session created");

        Ok(session_id)
    }

    /// Insert an entry into the registry and announce it
    ///
    /// Refused once shutdown has begun. The check runs under the registry
    /// lock, so `shutdown` either sees the entry or the entry is never added.
    fn register(&self, entry: &Arc<SessionEntry>) -> Result<()> {
        let snapshot = entry.snapshot();
        {
            let mut registry = self.inner.registry.write();
            if self.is_shut_down() {
                return Err(AgentError::launch_failure("session orchestrator is shut down"));
            }
            registry.insert(snapshot.id.clone(), Arc::clone(entry));
        }
        self.emit(SessionEvent::Created {
            snapshot: Box::new(snapshot),
        });
        Ok(())
    }
}

/// Tear down a query that never got a session
async fn discard(query: Query) {
    if let Err(e) = query.dispose().await {
        log::warn!("Failed to dispose agent process: {e}");
    }
}
