//! Type definitions for the agent session engine
//!
//! This module contains all the type definitions used throughout the crate,
//! organized into logical submodules:
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `AgentSessionId`, `ToolName`, `RequestId`)
//! - [`permissions`] - Permission modes and denial records
//! - [`messages`] - Message and content block types
//! - [`stream_event`] - Partial-update payloads carried by `stream_event` messages
//! - [`options`] - Agent invocation options
//! - [`context`] - Host-owned working context and session history

pub mod context;
pub mod identifiers;
pub mod messages;
pub mod options;
pub mod permissions;
pub mod stream_event;

// Re-export commonly used types
pub use context::{SessionHistory, WorkingContext};
pub use identifiers::{AgentSessionId, RequestId, SessionId, ToolName};
pub use messages::{
    AssistantMessageContent, ContentBlock, ContentValue, ImageSource, Message, MessageKind,
    ModelUsage, Usage, UserContent, UserMessageContent,
};
pub use options::{AgentOptions, AgentOptionsBuilder, SystemPrompt};
pub use permissions::{PermissionDenial, PermissionMode};
pub use stream_event::{ContentDelta, StreamEventPayload};
