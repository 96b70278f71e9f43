//! Control protocol for side-channel commands
//!
//! Besides user messages, the agent accepts `control_request` lines on its
//! input: permission-mode and model changes, thinking budgets, file rewinds
//! and a graceful interrupt.
//!
//! # Example
//!
//! ```rust
//! use agent_session_engine::control::{ControlCommand, ControlEncoder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let encoder = ControlEncoder::new();
//! let request = encoder.command(&ControlCommand::SetModel {
//!     model: Some("sonnet".to_string()),
//! });
//!
//! let line = encoder.encode(&request)?;
//! assert!(line.ends_with('\n'));
//! # Ok(())
//! # }
//! ```

mod handler;
mod messages;

pub use handler::ControlEncoder;
pub use messages::{ControlCommand, ControlRequest};
