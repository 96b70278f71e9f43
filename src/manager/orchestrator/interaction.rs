//! Session interaction methods
//!
//! Every operation here holds the session's operation lock, so sends,
//! resumes, interrupts and ends on one session never interleave.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::query::Query;
use crate::transport::PromptInput;
use crate::types::identifiers::{AgentSessionId, SessionId};
use crate::types::permissions::PermissionMode;

use super::super::events::SessionEvent;
use super::super::session::{SessionEntry, SessionState};
use super::core::SessionOrchestrator;

impl SessionOrchestrator {
    /// Send a turn to a session
    ///
    /// - `WaitingForInput`: moves to `Processing`, starts reading, writes the turn.
    /// - `Starting`, `Active`, `Processing`: writes the turn to the running agent.
    /// - terminal: resumes the agent session with the text as a one-shot
    ///   prompt on a fresh process and moves to `Processing`.
    ///
    /// # Errors
    /// - `AgentError::SessionNotFound` for an unknown id
    /// - `AgentError::NotResumable` for a terminal session whose agent
    ///   session id was never learned; the session is left unchanged
    /// - `AgentError::ClosedTransport` when the running agent takes no input
    pub async fn send_message(&self, session_id: &SessionId, text: &str) -> Result<()> {
        let entry = self.entry(session_id)?;
        let _guard = entry.op_lock.lock().await;

        match entry.state() {
            SessionState::WaitingForInput => {
                let query = entry.query().ok_or(AgentError::ClosedTransport)?;
                self.transition(&entry, SessionState::Processing);
                self.ensure_reading(&entry);
                query.send_message(text).await
            }
            SessionState::Starting | SessionState::Active | SessionState::Processing => {
                let query = entry.query().ok_or(AgentError::ClosedTransport)?;
                query.send_message(text).await
            }
            SessionState::Completed | SessionState::Error | SessionState::Cancelled => {
                let agent_session_id = resumable_id(&entry)?;
                self.release(&entry).await;
                let query = self
                    .relaunch(&entry, &agent_session_id, PromptInput::String(text.to_string()))
                    .await?;
                self.bind(&entry, query, SessionState::Processing, true);
                log::info!("[{session_id}] Resumed {agent_session_id} with a new turn");
                Ok(())
            }
        }
    }

    /// Resume the agent session on a fresh streaming process
    ///
    /// Any bound process is disposed first. The session moves to `Active`.
    ///
    /// # Errors
    /// - `AgentError::SessionNotFound` for an unknown id
    /// - `AgentError::NotResumable` if no agent session id was learned
    /// - `AgentError::LaunchFailure` if the agent cannot be started
    pub async fn resume_session(&self, session_id: &SessionId) -> Result<()> {
        let entry = self.entry(session_id)?;
        let _guard = entry.op_lock.lock().await;

        let agent_session_id = resumable_id(&entry)?;
        self.release(&entry).await;
        let query = self
            .relaunch(&entry, &agent_session_id, PromptInput::idle())
            .await?;
        self.bind(&entry, query, SessionState::Active, true);
        log::info!("[{session_id}] Resumed {agent_session_id}");
        Ok(())
    }

    /// Stop a session's current work by killing its process tree
    ///
    /// The session becomes `Cancelled` before the process is killed.
    /// Terminal sessions are left untouched.
    ///
    /// # Errors
    /// - `AgentError::SessionNotFound` for an unknown id
    /// - `AgentError::Timeout` if the process outlives the grace period
    pub async fn interrupt_session(&self, session_id: &SessionId) -> Result<()> {
        let entry = self.entry(session_id)?;
        let _guard = entry.op_lock.lock().await;

        if entry.state().is_terminal() {
            log::debug!("[{session_id}] Interrupt ignored, session already ended");
            return Ok(());
        }

        let query = entry.query();
        if let Some(ref query) = query {
            query.cancel();
        }
        self.cancel(&entry);
        match query {
            Some(query) => query.interrupt().await,
            None => Ok(()),
        }
    }

    /// End a session and release its process
    ///
    /// A live session becomes `Cancelled`; a terminal one keeps its state.
    /// Ending twice is a no-op.
    ///
    /// # Errors
    /// Returns `AgentError::SessionNotFound` for an unknown id
    pub async fn end_session(&self, session_id: &SessionId) -> Result<()> {
        let entry = self.entry(session_id)?;
        let _guard = entry.op_lock.lock().await;

        if let Some(query) = entry.query() {
            query.cancel();
        }
        if !entry.state().is_terminal() {
            self.cancel(&entry);
        }
        self.release(&entry).await;
        Ok(())
    }

    /// End a session and drop it from the registry
    ///
    /// # Errors
    /// Returns `AgentError::SessionNotFound` for an unknown id
    pub async fn remove_session(&self, session_id: &SessionId) -> Result<()> {
        self.end_session(session_id).await?;
        self.inner.registry.write().remove(session_id);
        log::info!("[{session_id}] Session removed");
        Ok(())
    }

    /// Change the permission mode of a streaming session's agent
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` if the agent takes no input
    pub async fn set_permission_mode(
        &self,
        session_id: &SessionId,
        mode: PermissionMode,
    ) -> Result<()> {
        let query = self.bound_query(session_id)?;
        query.set_permission_mode(mode).await
    }

    /// Switch the model of a streaming session's agent
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` if the agent takes no input
    pub async fn set_model(&self, session_id: &SessionId, model: Option<String>) -> Result<()> {
        let query = self.bound_query(session_id)?;
        query.set_model(model).await
    }

    /// Change the thinking-token budget of a streaming session's agent
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` if the agent takes no input
    pub async fn set_max_thinking_tokens(
        &self,
        session_id: &SessionId,
        max_thinking_tokens: Option<u32>,
    ) -> Result<()> {
        let query = self.bound_query(session_id)?;
        query.set_max_thinking_tokens(max_thinking_tokens).await
    }

    /// Roll a streaming session's tracked files back to a prior user message
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` if the agent takes no input
    pub async fn rewind_files(
        &self,
        session_id: &SessionId,
        user_message_id: impl Into<String>,
    ) -> Result<()> {
        let query = self.bound_query(session_id)?;
        query.rewind_files(user_message_id).await
    }

    fn bound_query(&self, session_id: &SessionId) -> Result<Arc<Query>> {
        self.entry(session_id)?
            .query()
            .ok_or(AgentError::ClosedTransport)
    }

    /// Start a resumed process in the session's working directory
    async fn relaunch(
        &self,
        entry: &SessionEntry,
        agent_session_id: &AgentSessionId,
        prompt: PromptInput,
    ) -> Result<Query> {
        let context = Arc::clone(&entry.tracked.read().session.context);
        let mut options = self.launch_options(context.as_ref(), None);
        options.resume = Some(agent_session_id.clone());
        // The prefix belongs to the conversation's first turn only
        options.prompt_prefix = None;
        self.launch(prompt, options).await
    }

    /// Start the read loop of the current binding if it is not running
    fn ensure_reading(&self, entry: &Arc<SessionEntry>) {
        let generation = entry.generation();
        let mut binding = entry.binding.lock();
        if let Some(binding) = binding.as_mut()
            && binding.read_loop.is_none()
        {
            binding.read_loop = Some(self.start_read_loop(entry, &binding.query, generation));
        }
    }

    /// Ordinary transition requested by an operation
    fn transition(&self, entry: &SessionEntry, next: SessionState) {
        self.transition_with(entry, next, false);
    }

    /// Move a live session to `Cancelled` and detach its read loop
    ///
    /// Messages the loop has already pulled from the stream are dropped
    /// instead of landing after the `Ended` event.
    fn cancel(&self, entry: &SessionEntry) {
        self.transition_with(entry, SessionState::Cancelled, true);
    }

    fn transition_with(&self, entry: &SessionEntry, next: SessionState, detach: bool) {
        let mut tracked = entry.tracked.write();
        if detach {
            tracked.generation += 1;
        }
        let Some(previous) = tracked.session.transition(next) else {
            return;
        };

        // Emitted under the record lock to keep order with the read loop
        let session = &tracked.session;
        log::info!("[{}] {previous} -> {next}", session.id);
        self.emit(SessionEvent::StateChanged {
            session_id: session.id.clone(),
            previous,
            current: next,
        });
        if next.is_terminal() {
            self.emit(SessionEvent::Ended {
                session_id: session.id.clone(),
                state: next,
                ended_at: session.ended_at,
                total_cost: session.total_cost,
            });
        }
    }
}

fn resumable_id(entry: &SessionEntry) -> Result<AgentSessionId> {
    let tracked = entry.tracked.read();
    tracked
        .session
        .agent_session_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AgentError::not_resumable(&tracked.session.id))
}
