//! Request numbering and framing for control commands

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::types::identifiers::RequestId;

use super::messages::{ControlCommand, ControlRequest};

/// Frames control commands for one agent process
///
/// Request ids are unique per process, so each transport owns one encoder.
#[derive(Debug)]
pub struct ControlEncoder {
    next_request_id: AtomicU64,
}

impl ControlEncoder {
    /// Create a new encoder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Generate next request ID
    #[must_use]
    pub fn next_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        RequestId::new(format!("req-{id}"))
    }

    /// Build the envelope for a named command
    pub fn request(&self, name: &str, payload: serde_json::Value) -> ControlRequest {
        ControlRequest::new(self.next_id(), name, payload)
    }

    /// Build the envelope for a typed command
    #[must_use]
    pub fn command(&self, command: &ControlCommand) -> ControlRequest {
        self.request(command.name(), command.payload())
    }

    /// Serialize a request to one wire line, newline included
    ///
    /// # Errors
    /// Returns error if JSON serialization fails
    pub fn encode(&self, request: &ControlRequest) -> Result<String> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        Ok(line)
    }
}

impl Default for ControlEncoder {
    fn default() -> Self {
        Self::new()
    }
}
