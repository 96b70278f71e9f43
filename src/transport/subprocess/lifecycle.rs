//! Lifecycle management for subprocess transport (connect, interrupt, close)

use std::process::Stdio;
use std::sync::atomic::Ordering;

use command_group::AsyncCommandGroup;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStderr;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::{AgentError, Result};

use super::command::CommandBuilder;
use super::config::{DANGEROUS_ENV_VARS, PromptInput};
use super::transport::SubprocessTransport;

impl SubprocessTransport {
    /// Spawn the agent in its own process group with piped stdio
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if the process cannot be started
    pub(super) async fn connect_impl(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }

        let builder = CommandBuilder::new(&self.cli_path, &self.prompt, &self.options);
        let command_line = builder.command_line();
        let mut cmd = builder.build();

        for (key, value) in &self.options.env {
            if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
                log::warn!("Not forwarding environment variable {key} to the agent");
                continue;
            }
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.options.cwd {
            if !cwd.is_dir() {
                return Err(AgentError::launch_failure(format!(
                    "Working directory does not exist: {}",
                    cwd.display()
                )));
            }
            cmd.env("PWD", cwd);
            cmd.current_dir(cwd);
        }

        // stderr is piped, never inherited, so the child cannot touch the
        // host terminal
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("Launching agent: {command_line}");
        let mut child = cmd.group_spawn().map_err(|e| {
            AgentError::launch_failure(format!("Failed to start `{command_line}`: {e}"))
        })?;

        let inner = child.inner();
        let stdin = inner.stdin.take();
        let stdout = inner.stdout.take();
        let stderr = inner.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            let _ = child.start_kill();
            return Err(AgentError::launch_failure("Failed to capture agent stdio"));
        };

        self.stderr_task = Some(tokio::spawn(forward_stderr(stderr, self.max_buffer_size)));
        self.stdin = Some(stdin);
        self.stdout = Some(FramedRead::new(
            stdout,
            LinesCodec::new_with_max_length(self.max_buffer_size),
        ));
        self.process = Some(child);
        self.ready.store(true, Ordering::SeqCst);

        match &self.prompt {
            PromptInput::String(_) => {
                // One-shot: the prompt is already on the command line
                if let Some(mut stdin) = self.stdin.take() {
                    let _ = stdin.shutdown().await;
                }
            }
            PromptInput::Stream {
                first_turn: Some(text),
            } => {
                let text = text.clone();
                self.send_user_text(&text).await?;
            }
            PromptInput::Stream { first_turn: None } => {}
        }

        Ok(())
    }

    /// Kill the whole process tree and wait for the leader to exit
    ///
    /// # Errors
    /// Returns `AgentError::Timeout` if the process outlives the grace period
    pub async fn interrupt(&mut self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        self.stdin = None;

        let Some(child) = self.process.as_mut() else {
            return Ok(());
        };

        if let Err(e) = child.start_kill() {
            log::debug!("Kill signal not delivered (process likely gone): {e}");
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                log::debug!("Agent exited after interrupt: {status}");
                Ok(())
            }
            Ok(Err(e)) => Err(AgentError::Io(e)),
            Err(_) => Err(AgentError::timeout(format!(
                "agent did not exit within {:?} of being killed",
                self.grace
            ))),
        }
    }

    /// Close the transport and clean up resources
    ///
    /// Input is closed first so the agent can exit on its own; after the
    /// grace period the process tree is killed. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns error if waiting on the process fails
    pub(super) async fn close_impl(&mut self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        self.stdout = None;

        let result = if let Some(mut child) = self.process.take() {
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!("Agent exited: {status}");
                    Ok(())
                }
                Ok(Err(e)) => Err(AgentError::Io(e)),
                Err(_) => {
                    log::warn!(
                        "Agent did not exit within {:?}, killing process group",
                        self.grace
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    Ok(())
                }
            }
        } else {
            Ok(())
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        result
    }

    /// Best-effort cleanup on drop
    pub(super) fn drop_impl(&mut self) {
        self.stdin = None;

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        if let Some(mut child) = self.process.take()
            && matches!(child.try_wait(), Ok(None))
        {
            let _ = child.start_kill();
        }
    }
}

/// Drain stderr into the log so the child never blocks on a full pipe
async fn forward_stderr(stderr: ChildStderr, max_line: usize) {
    let mut lines = FramedRead::new(stderr, LinesCodec::new_with_max_length(max_line));
    let mut after_error = false;

    loop {
        match lines.next().await {
            Some(Ok(line)) => {
                after_error = false;
                if !line.trim().is_empty() {
                    log::debug!("[agent stderr] {line}");
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => after_error = true,
            Some(Err(LinesCodecError::Io(e))) if e.kind() == std::io::ErrorKind::InvalidData => {
                after_error = true;
            }
            Some(Err(LinesCodecError::Io(_))) => break,
            // A decode error is followed by one `None` before reading resumes
            None if after_error => after_error = false,
            None => break,
        }
    }
}
