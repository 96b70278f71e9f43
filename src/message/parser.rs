//! Message parser for agent wire output

use crate::error::{AgentError, Result};
use crate::types::messages::Message;

/// Parse a JSON value into a typed Message
///
/// # Arguments
/// * `data` - Raw JSON value from agent output
///
/// # Errors
/// Returns `AgentError::MessageParse` if the JSON is not a known message variant
pub fn parse_message(data: serde_json::Value) -> Result<Message> {
    serde_json::from_value(data.clone()).map_err(|e| {
        AgentError::message_parse(format!("Failed to parse message: {e}"), Some(data))
    })
}

/// Decode one wire line into a message
///
/// Blank lines, malformed JSON and unknown `type` discriminators all yield
/// `None`; the caller skips them and keeps reading.
#[must_use]
pub fn decode_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Skipping non-JSON output line: {e}");
            return None;
        }
    };

    match parse_message(value) {
        Ok(message) => Some(message),
        Err(AgentError::MessageParse { message, data }) => {
            let kind = data
                .as_ref()
                .and_then(|d| d.get("type"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<missing>");
            log::debug!("Skipping undecodable '{kind}' line: {message}");
            None
        }
        Err(e) => {
            log::debug!("Skipping undecodable line: {e}");
            None
        }
    }
}

/// Encode a message as one wire line, newline included
///
/// # Errors
/// Returns `AgentError::Json` if serialization fails
pub fn encode_line(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
