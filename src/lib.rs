//! # Agent Session Engine
//!
//! Drive a command-line coding agent as a long-lived, controllable,
//! multi-turn conversational worker, and manage many of them at once.
//!
//! The agent is started as a subprocess and speaks newline-delimited JSON
//! over its standard streams. This crate provides:
//!
//! - a typed protocol model for everything the agent can say ([`Message`])
//! - a subprocess transport that owns the process tree ([`SubprocessTransport`])
//! - a [`Query`] wrapping one process with a single-pass message stream and
//!   control operations
//! - a [`SessionOrchestrator`] tracking sessions through a state machine,
//!   re-homing them onto fresh processes on resume and emitting events
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use agent_session_engine::{EventMask, OrchestratorConfig, SessionEvent, SessionOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = SessionOrchestrator::new(OrchestratorConfig::from_env()?);
//!     let mut events = orchestrator.subscribe(EventMask::MESSAGE | EventMask::ENDED);
//!
//!     let id = orchestrator
//!         .create_session(Arc::new(PathBuf::from(".")), "What is 2 + 2?", None)
//!         .await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::MessageReceived { message, .. } => {
//!                 if let Some(text) = message.assistant_text() {
//!                     println!("{text}");
//!                 }
//!             }
//!             SessionEvent::Ended { session_id, state, .. } if session_id == id => {
//!                 println!("session ended: {state}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Session lifecycle
//!
//! ```text
//! Starting ──init──▶ Active ◀──▶ Processing
//!                      │
//!                      ▼
//!               WaitingForInput ──send──▶ Processing
//!
//! any live state ──result / fault / cancel──▶ Completed | Error | Cancelled
//! terminal ──send / resume (rebind)──▶ Processing | Active
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, AgentError>`:
//!
//! ```no_run
//! # use agent_session_engine::{AgentError, SessionId, SessionOrchestrator};
//! # async fn example(orchestrator: SessionOrchestrator, id: SessionId) {
//! match orchestrator.send_message(&id, "continue").await {
//!     Ok(()) => {}
//!     Err(AgentError::NotResumable(id)) => eprintln!("{id} never reported an agent session id"),
//!     Err(AgentError::SessionNotFound(id)) => eprintln!("unknown session {id}"),
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod message;
pub mod query;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use config::{AgentCli, OrchestratorConfig, OrchestratorConfigBuilder};
pub use control::{ControlCommand, ControlEncoder, ControlRequest};
pub use error::{AgentError, Result};
pub use manager::{
    EventMask, Session, SessionEvent, SessionOrchestrator, SessionSnapshot, SessionState,
    Subscription,
};
pub use message::{decode_line, encode_line, parse_message};
pub use query::Query;
pub use transport::{MessageStream, PromptInput, SubprocessTransport, Transport};

// Re-export type submodules for flat public API
pub use types::context::{SessionHistory, WorkingContext};
pub use types::identifiers::{AgentSessionId, RequestId, SessionId, ToolName};
pub use types::messages::{ContentBlock, ContentValue, Message, MessageKind, UserContent};
pub use types::options::{AgentOptions, AgentOptionsBuilder, SystemPrompt};
pub use types::permissions::{PermissionDenial, PermissionMode};

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
