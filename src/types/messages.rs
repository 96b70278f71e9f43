//! Message-related type definitions
//!
//! This module contains the closed set of protocol messages the agent emits
//! (and the `user` messages the engine sends back), plus the content blocks
//! they carry. Every message is keyed by its `type` field on the wire.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::identifiers::AgentSessionId;
use super::permissions::PermissionDenial;
use super::stream_event::StreamEventPayload;

/// `system` subtype announcing a new agent session
pub const SYSTEM_INIT: &str = "init";

/// `system` subtype marking a context compaction
pub const SYSTEM_COMPACT_BOUNDARY: &str = "compact_boundary";

// ============================================================================
// Content Blocks
// ============================================================================

/// Content value for tool results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    /// String content
    String(String),
    /// Structured content blocks
    Blocks(Vec<serde_json::Value>),
}

/// Image payload of an image content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Inline base64 data
    Base64 {
        /// MIME type, e.g. `image/png`
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Remote image
    Url {
        /// Image URL
        url: String,
    },
    /// Source kinds this engine does not model, kept verbatim
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Content block types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Image content block
    Image {
        /// Image payload
        source: ImageSource,
    },
    /// Thinking content block (extended thinking)
    Thinking {
        /// Thinking content
        thinking: String,
        /// Signature for verification
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool use request
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Tool input parameters
        input: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this is a result for
        tool_use_id: String,
        /// Result content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ContentValue>,
        /// Whether this is an error result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Block types this engine does not model, kept verbatim
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a base64 image block
    pub fn image_base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource::Base64 {
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }
}

// ============================================================================
// Message Bodies
// ============================================================================

/// User message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessageContent {
    /// Message role (always "user")
    pub role: String,
    /// Message content
    pub content: UserContent,
}

/// User content can be string or blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain string content
    String(String),
    /// Structured content blocks
    Blocks(Vec<ContentBlock>),
}

/// Token usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens written to the prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Tokens served from the prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Per-model usage breakdown reported in `result` messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Prompt tokens
    #[serde(default, alias = "inputTokens")]
    pub input_tokens: u64,
    /// Completion tokens
    #[serde(default, alias = "outputTokens")]
    pub output_tokens: u64,
    /// Tokens served from the prompt cache
    #[serde(default, alias = "cacheReadInputTokens")]
    pub cache_read_input_tokens: u64,
    /// Tokens written to the prompt cache
    #[serde(default, alias = "cacheCreationInputTokens")]
    pub cache_creation_input_tokens: u64,
    /// Cost attributed to this model in USD
    #[serde(default, alias = "costUSD")]
    pub cost_usd: f64,
}

/// Assistant message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessageContent {
    /// Model-side message ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model that generated the message
    #[serde(default)]
    pub model: String,
    /// Message content blocks
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

// ============================================================================
// Messages
// ============================================================================

/// Message discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// `system`
    System,
    /// `assistant`
    Assistant,
    /// `user`
    User,
    /// `result`
    Result,
    /// `stream_event`
    StreamEvent,
}

impl MessageKind {
    /// Wire spelling of the discriminator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::Result => "result",
            Self::StreamEvent => "stream_event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// System message (`init`, `compact_boundary`, ...)
    System {
        /// System message subtype
        subtype: String,
        /// Message identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Agent session this message belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<AgentSessionId>,
        /// Working directory reported by `init`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        /// Tools available to the agent, reported by `init`
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools: Vec<String>,
        /// Model in use, reported by `init`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Remaining system message fields
        #[serde(flatten)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
    /// Assistant message
    Assistant {
        /// Message content
        message: AssistantMessageContent,
        /// Message identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Agent session this message belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<AgentSessionId>,
        /// Parent tool use ID for nested conversations
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// User message
    User {
        /// Message content
        message: UserMessageContent,
        /// Message identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Agent session this message belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<AgentSessionId>,
        /// Parent tool use ID for nested conversations
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// Result message closing a turn
    Result {
        /// Result subtype (`success`, `error_max_turns`, ...)
        subtype: String,
        /// Whether this is an error result
        is_error: bool,
        /// Number of conversation turns
        #[serde(default)]
        num_turns: u32,
        /// Total duration in milliseconds
        #[serde(default)]
        duration_ms: u64,
        /// API call duration in milliseconds
        #[serde(default)]
        duration_api_ms: u64,
        /// Total cost in USD
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        /// Token usage statistics
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        /// Usage broken down per model
        #[serde(
            default,
            alias = "modelUsage",
            skip_serializing_if = "HashMap::is_empty"
        )]
        model_usage: HashMap<String, ModelUsage>,
        /// Final result text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Structured output, when an output schema was requested
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured_output: Option<serde_json::Value>,
        /// Tool calls refused during the turn
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        permission_denials: Vec<PermissionDenial>,
        /// Message identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Agent session this message belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<AgentSessionId>,
    },
    /// Stream event for partial messages
    StreamEvent {
        /// Raw stream event data
        event: StreamEventPayload,
        /// Message identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Agent session this message belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<AgentSessionId>,
        /// Parent tool use ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
}

impl Message {
    /// Build an outgoing user message with plain text content
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user_content(UserContent::String(text.into()))
    }

    /// Build an outgoing user message from content blocks
    #[must_use]
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::user_content(UserContent::Blocks(blocks))
    }

    fn user_content(content: UserContent) -> Self {
        Self::User {
            message: UserMessageContent {
                role: "user".to_string(),
                content,
            },
            uuid: None,
            session_id: None,
            parent_tool_use_id: None,
        }
    }

    /// Discriminator of this message
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::System { .. } => MessageKind::System,
            Self::Assistant { .. } => MessageKind::Assistant,
            Self::User { .. } => MessageKind::User,
            Self::Result { .. } => MessageKind::Result,
            Self::StreamEvent { .. } => MessageKind::StreamEvent,
        }
    }

    /// Message identifier, if the agent supplied one
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::System { uuid, .. }
            | Self::Assistant { uuid, .. }
            | Self::User { uuid, .. }
            | Self::Result { uuid, .. }
            | Self::StreamEvent { uuid, .. } => uuid.as_deref(),
        }
    }

    /// Agent session this message belongs to
    #[must_use]
    pub const fn session_id(&self) -> Option<&AgentSessionId> {
        match self {
            Self::System { session_id, .. }
            | Self::Assistant { session_id, .. }
            | Self::User { session_id, .. }
            | Self::Result { session_id, .. }
            | Self::StreamEvent { session_id, .. } => session_id.as_ref(),
        }
    }

    /// Whether this message ends a turn
    #[must_use]
    pub const fn is_result(&self) -> bool {
        matches!(self, Self::Result { .. })
    }

    /// Agent session id announced by a `system/init` message
    #[must_use]
    pub fn init_session_id(&self) -> Option<&AgentSessionId> {
        match self {
            Self::System {
                subtype,
                session_id: Some(id),
                ..
            } if subtype == SYSTEM_INIT && !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Concatenated text blocks of an assistant message
    #[must_use]
    pub fn assistant_text(&self) -> Option<String> {
        let Self::Assistant { message, .. } = self else {
            return None;
        };
        let text: Vec<&str> = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join("\n"))
        }
    }
}
