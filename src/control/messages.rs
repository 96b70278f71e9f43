//! Control protocol message types
//!
//! Side-channel commands are written to the agent's input next to user
//! messages, wrapped in a `control_request` envelope.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::types::identifiers::RequestId;
use crate::types::permissions::PermissionMode;

/// Typed side-channel command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Ask the agent to abort its current turn
    Interrupt,
    /// Change the permission mode for subsequent tool calls
    SetPermissionMode {
        /// New permission mode
        mode: PermissionMode,
    },
    /// Switch model; `None` restores the default
    SetModel {
        /// Model name
        model: Option<String>,
    },
    /// Change the thinking-token budget; `None` disables the limit
    SetMaxThinkingTokens {
        /// Token budget
        max_thinking_tokens: Option<u32>,
    },
    /// Roll tracked files back to their state at a prior user message
    RewindFiles {
        /// Message identifier of the user message to rewind to
        user_message_id: String,
    },
}

impl ControlCommand {
    /// Wire subtype of the command
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::SetModel { .. } => "set_model",
            Self::SetMaxThinkingTokens { .. } => "set_max_thinking_tokens",
            Self::RewindFiles { .. } => "rewind_files",
        }
    }

    /// Command arguments as a JSON object
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Interrupt => json!({}),
            Self::SetPermissionMode { mode } => json!({ "mode": mode }),
            Self::SetModel { model } => json!({ "model": model }),
            Self::SetMaxThinkingTokens {
                max_thinking_tokens,
            } => json!({ "max_thinking_tokens": max_thinking_tokens }),
            Self::RewindFiles { user_message_id } => {
                json!({ "user_message_id": user_message_id })
            }
        }
    }
}

/// `control_request` envelope as written to the agent
#[derive(Debug, Clone, Serialize)]
pub struct ControlRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Unique request identifier
    pub request_id: RequestId,
    /// `{"subtype": <name>, ...payload}`
    pub request: Map<String, Value>,
}

impl ControlRequest {
    /// Build an envelope from a command name and payload
    ///
    /// A payload that is not a JSON object is carried under a `value` key.
    pub fn new(request_id: RequestId, name: &str, payload: Value) -> Self {
        let mut request = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        request.insert("subtype".to_string(), Value::String(name.to_string()));

        Self {
            kind: "control_request",
            request_id,
            request,
        }
    }

    /// Wire subtype of this request
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.request.get("subtype").and_then(Value::as_str)
    }
}
