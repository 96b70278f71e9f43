//! Subprocess transport implementation
//!
//! Spawns the agent executable in its own process group and communicates
//! with it via stdin/stdout. stderr is drained into the log.

mod command;
mod config;
mod lifecycle;
mod reader;
mod transport;

// Re-export public types
pub use command::CommandBuilder;
pub use config::{DANGEROUS_ENV_VARS, DEFAULT_MAX_BUFFER_SIZE, PromptInput};
pub use transport::SubprocessTransport;
