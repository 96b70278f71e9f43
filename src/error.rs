//! Error types for the agent session engine

use thiserror::Error;

use crate::types::identifiers::SessionId;

/// Main error type for the agent session engine
#[derive(Error, Debug)]
pub enum AgentError {
    /// Agent executable could not be resolved or the OS refused to start it
    #[error("Failed to launch agent: {0}")]
    LaunchFailure(String),

    /// Write attempted after the agent's input stream was closed
    #[error("Transport input is closed")]
    ClosedTransport,

    /// A single-pass message stream was iterated a second time
    #[error("Message stream has already been consumed")]
    AlreadyConsumed,

    /// Session id unknown to the orchestrator
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Operation needs an agent-assigned session id that was never learned
    #[error("Session {0} has no agent session id and cannot be resumed")]
    NotResumable(SessionId),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Process execution error with exit code
    #[error("Process error (exit code {exit_code:?}): {message}")]
    Process {
        /// Error message
        message: String,
        /// Process exit code, if the process exited normally
        exit_code: Option<i32>,
    },

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message parse error with optional raw data
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw message data that failed to parse
        data: Option<serde_json::Value>,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a launch failure error
    pub fn launch_failure(msg: impl Into<String>) -> Self {
        Self::LaunchFailure(msg.into())
    }

    /// Create a launch failure for an executable that could not be located
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::LaunchFailure(
            "Agent executable not found. Install it with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             or point AGENT_CLI_PATH at the binary"
                .to_string(),
        )
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Process {
            message: msg.into(),
            exit_code,
        }
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            data,
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a session not found error
    #[must_use]
    pub fn session_not_found(session_id: &SessionId) -> Self {
        Self::SessionNotFound(session_id.clone())
    }

    /// Create a not resumable error
    #[must_use]
    pub fn not_resumable(session_id: &SessionId) -> Self {
        Self::NotResumable(session_id.clone())
    }
}
