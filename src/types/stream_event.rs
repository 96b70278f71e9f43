//! Partial-update envelope payloads
//!
//! When partial messages are enabled the agent wraps raw model stream events
//! in `stream_event` messages. They only matter for progressive rendering;
//! the complete `assistant` message still follows.

use serde::{Deserialize, Serialize};

/// Incremental delta carried by a `content_block_delta` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Appended text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Appended fragment of a tool-use input document
    InputJsonDelta {
        /// Partial JSON text
        partial_json: String,
    },
    /// Appended thinking text
    ThinkingDelta {
        /// Thinking fragment
        thinking: String,
    },
    /// Thinking signature
    SignatureDelta {
        /// Signature fragment
        signature: String,
    },
    /// Delta kinds this engine does not model, kept verbatim
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Raw model stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventPayload {
    /// A new assistant message begins
    MessageStart {
        /// Message skeleton
        message: serde_json::Value,
    },
    /// Message-level metadata changed (stop reason, usage)
    MessageDelta {
        /// Changed fields
        delta: serde_json::Value,
        /// Usage counters so far
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<serde_json::Value>,
    },
    /// The assistant message is complete
    MessageStop,
    /// A content block begins at `index`
    ContentBlockStart {
        /// Block position within the message
        index: u32,
        /// Block skeleton
        content_block: serde_json::Value,
    },
    /// Incremental content for the block at `index`
    ContentBlockDelta {
        /// Block position within the message
        index: u32,
        /// The increment
        delta: ContentDelta,
    },
    /// The block at `index` is complete
    ContentBlockStop {
        /// Block position within the message
        index: u32,
    },
    /// Event kinds this engine does not model, kept verbatim
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl StreamEventPayload {
    /// Text appended by this event, if it is a text delta
    #[must_use]
    pub fn text_delta(&self) -> Option<&str> {
        match self {
            Self::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } => Some(text),
            _ => None,
        }
    }
}
