//! `Query` implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::control::ControlCommand;
use crate::error::{AgentError, Result};
use crate::transport::{MessageStream, PromptInput, SubprocessTransport, Transport};
use crate::types::identifiers::AgentSessionId;
use crate::types::messages::Message;
use crate::types::options::AgentOptions;
use crate::types::permissions::PermissionMode;

/// Runtime handle on one agent process
pub struct Query {
    transport: Arc<Mutex<SubprocessTransport>>,
    streaming: bool,
    consumed: AtomicBool,
    disposed: AtomicBool,
    cancel: CancellationToken,
    agent_session_id: Arc<RwLock<Option<AgentSessionId>>>,
}

impl Query {
    /// Launch the agent and wrap it
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the process cannot be started
    pub async fn spawn(
        cli_path: impl Into<PathBuf>,
        prompt: PromptInput,
        options: AgentOptions,
    ) -> Result<Self> {
        Self::start(SubprocessTransport::new(prompt, options, cli_path)).await
    }

    /// Launch the agent with a custom teardown grace period
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the process cannot be started
    pub async fn spawn_with_grace(
        cli_path: impl Into<PathBuf>,
        prompt: PromptInput,
        options: AgentOptions,
        grace: Duration,
    ) -> Result<Self> {
        Self::start(SubprocessTransport::new(prompt, options, cli_path).with_grace(grace)).await
    }

    /// Connect a prepared transport and wrap it
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the process cannot be started
    pub async fn start(mut transport: SubprocessTransport) -> Result<Self> {
        transport.connect().await?;
        let streaming = transport.is_streaming();
        if let Some(pid) = transport.pid() {
            log::info!("Agent started (pid {pid}, streaming: {streaming})");
        }

        Ok(Self {
            transport: Arc::new(Mutex::new(transport)),
            streaming,
            consumed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            agent_session_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Take the message stream
    ///
    /// Iteration stops when either `cancel` or this query's own token is
    /// cancelled, checked before every item.
    ///
    /// # Errors
    /// Returns `AgentError::AlreadyConsumed` on a second call
    pub async fn messages(&self, cancel: &CancellationToken) -> Result<MessageStream> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyConsumed);
        }

        let token = self.cancel.child_token();
        let mut inner = self.transport.lock().await.read_messages(token.clone())?;

        let outer = cancel.clone();
        let linked = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = outer.cancelled() => linked.cancel(),
                () = linked.cancelled() => {}
            }
        });

        let agent_session_id = Arc::clone(&self.agent_session_id);

        let messages = stream! {
            // Releases the link task once the stream is dropped
            let _link = token.clone().drop_guard();

            while let Some(item) = inner.next().await {
                if token.is_cancelled() {
                    break;
                }
                if let Some(id) = item.as_ref().ok().and_then(Message::init_session_id) {
                    let mut slot = agent_session_id.write();
                    if slot.is_none() {
                        log::debug!("Agent session id: {id}");
                        *slot = Some(id.clone());
                    }
                }
                yield item;
            }
        };

        Ok(messages.boxed())
    }

    /// Agent session id from the first `init` message, once seen
    #[must_use]
    pub fn agent_session_id(&self) -> Option<AgentSessionId> {
        self.agent_session_id.read().clone()
    }

    /// Whether turns are written to stdin
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Send a text turn
    ///
    /// The configured prompt prefix is placed before the first streamed turn.
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries or after
    /// input was closed
    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.transport.lock().await.send_user_text(text).await
    }

    /// Send an arbitrary protocol message
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.transport.lock().await.send(message).await
    }

    /// Stop iteration and kill the process tree
    ///
    /// # Errors
    /// Returns `AgentError::Timeout` if the process outlives the grace period
    pub async fn interrupt(&self) -> Result<()> {
        self.cancel.cancel();
        self.transport.lock().await.interrupt().await
    }

    /// Change the permission mode of a streaming query
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        self.send_control(&ControlCommand::SetPermissionMode { mode })
            .await
    }

    /// Switch the model of a streaming query
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn set_model(&self, model: Option<String>) -> Result<()> {
        self.send_control(&ControlCommand::SetModel { model }).await
    }

    /// Change the thinking-token budget of a streaming query
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn set_max_thinking_tokens(&self, max_thinking_tokens: Option<u32>) -> Result<()> {
        self.send_control(&ControlCommand::SetMaxThinkingTokens {
            max_thinking_tokens,
        })
        .await
    }

    /// Roll tracked files back to a prior user message
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn rewind_files(&self, user_message_id: impl Into<String>) -> Result<()> {
        self.send_control(&ControlCommand::RewindFiles {
            user_message_id: user_message_id.into(),
        })
        .await
    }

    /// Send a typed control command
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn send_control(&self, command: &ControlCommand) -> Result<()> {
        self.transport.lock().await.send_control(command).await
    }

    /// Send a named control command with a raw payload
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` for one-shot queries
    pub async fn send_command(&self, name: &str, payload: serde_json::Value) -> Result<()> {
        self.transport.lock().await.send_command(name, payload).await
    }

    /// Close the agent's input; the process keeps running until it exits
    ///
    /// # Errors
    /// Returns error if closing stdin fails
    pub async fn close_input(&self) -> Result<()> {
        self.transport.lock().await.end_input().await
    }

    /// Stop message iteration without touching the process
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether iteration was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the agent process is alive
    pub async fn is_running(&self) -> bool {
        self.transport.lock().await.is_running()
    }

    /// Cancel iteration and tear the process down
    ///
    /// Only the first call does any work.
    ///
    /// # Errors
    /// Returns error if waiting on the process fails
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.transport.lock().await.close().await
    }

    /// Whether `dispose` has been called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("streaming", &self.streaming)
            .field("consumed", &self.consumed.load(Ordering::SeqCst))
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .field("cancelled", &self.cancel.is_cancelled())
            .field("agent_session_id", &*self.agent_session_id.read())
            .finish_non_exhaustive()
    }
}
