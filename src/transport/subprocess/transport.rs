//! Subprocess transport for the agent executable

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use command_group::AsyncGroupChild;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_SHUTDOWN_GRACE;
use crate::control::{ControlCommand, ControlEncoder};
use crate::error::{AgentError, Result};
use crate::message::encode_line;
use crate::transport::{MessageStream, Transport};
use crate::types::messages::Message;
use crate::types::options::AgentOptions;

use super::command::CommandBuilder;
use super::config::{DEFAULT_MAX_BUFFER_SIZE, PromptInput};

/// Subprocess transport for the agent executable
pub struct SubprocessTransport {
    pub(super) prompt: PromptInput,
    pub(super) options: AgentOptions,
    pub(super) cli_path: PathBuf,
    pub(super) process: Option<AsyncGroupChild>,
    pub(super) stdin: Option<ChildStdin>,
    pub(super) stdout: Option<FramedRead<ChildStdout, LinesCodec>>,
    pub(super) stdout_taken: bool,
    pub(super) ready: Arc<AtomicBool>,
    pub(super) max_buffer_size: usize,
    pub(super) grace: Duration,
    pub(super) stderr_task: Option<JoinHandle<()>>,
    pub(super) control: ControlEncoder,
    pub(super) prefix_pending: bool,
}

impl SubprocessTransport {
    /// Create a new subprocess transport
    ///
    /// Nothing is started until [`Transport::connect`].
    ///
    /// # Arguments
    /// * `prompt` - One-shot prompt or streaming input
    /// * `options` - Invocation options
    /// * `cli_path` - Resolved agent executable
    #[must_use]
    pub fn new(prompt: PromptInput, options: AgentOptions, cli_path: impl Into<PathBuf>) -> Self {
        let max_buffer_size = options.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_SIZE);
        let prefix_pending = prompt.is_streaming();

        Self {
            prompt,
            options,
            cli_path: cli_path.into(),
            process: None,
            stdin: None,
            stdout: None,
            stdout_taken: false,
            ready: Arc::new(AtomicBool::new(false)),
            max_buffer_size,
            grace: DEFAULT_SHUTDOWN_GRACE,
            stderr_task: None,
            control: ControlEncoder::new(),
            prefix_pending,
        }
    }

    /// Set how long teardown waits before killing the process tree
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Executable this transport launches
    #[must_use]
    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }

    /// Whether turns are written to stdin
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.prompt.is_streaming()
    }

    /// Shell-escaped command line, for logs and diagnostics
    #[must_use]
    pub fn command_line(&self) -> String {
        CommandBuilder::new(&self.cli_path, &self.prompt, &self.options).command_line()
    }

    /// OS process id of the agent, while it is running
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(AsyncGroupChild::id)
    }

    /// Encode and write one protocol message
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let line = encode_line(message)?;
        self.write(&line).await
    }

    /// Send a user turn, placing the prompt prefix before the first one
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    pub async fn send_user_text(&mut self, text: &str) -> Result<()> {
        let text = if self.prefix_pending {
            self.options.prefixed_prompt(text)
        } else {
            text.to_string()
        };
        self.send(&Message::user_text(text)).await?;
        self.prefix_pending = false;
        Ok(())
    }

    /// Write a `control_request` line
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    pub async fn send_command(&mut self, name: &str, payload: serde_json::Value) -> Result<()> {
        let request = self.control.request(name, payload);
        let line = self.control.encode(&request)?;
        log::debug!("Sending control request {} ({name})", request.request_id.as_str());
        self.write(&line).await
    }

    /// Write a typed control command
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    pub async fn send_control(&mut self, command: &ControlCommand) -> Result<()> {
        self.send_command(command.name(), command.payload()).await
    }

    /// Whether the agent process is still alive
    pub fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}

impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connect_impl().await
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(AgentError::ClosedTransport)?;

        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| AgentError::transport(format!("Failed to write to stdin: {e}")))?;

        stdin
            .flush()
            .await
            .map_err(|e| AgentError::transport(format!("Failed to flush stdin: {e}")))?;

        Ok(())
    }

    async fn end_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| AgentError::transport(format!("Failed to close stdin: {e}")))?;
        }
        Ok(())
    }

    fn read_messages(&mut self, cancel: CancellationToken) -> Result<MessageStream> {
        self.read_messages_impl(cancel)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.close_impl().await
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.drop_impl();
    }
}
