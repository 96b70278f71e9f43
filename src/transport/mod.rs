//! Transport layer for talking to the agent process
//!
//! This module provides the transport abstraction and the subprocess
//! implementation that exchanges newline-delimited JSON with the agent over
//! its standard streams.

pub mod subprocess;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::messages::Message;

/// Lazy, finite sequence of decoded agent messages
pub type MessageStream = BoxStream<'static, Result<Message>>;

/// Transport trait for communicating with an agent process
///
/// This trait defines the interface for sending and receiving messages
/// to/from the agent.
pub trait Transport: Send + Sync {
    /// Connect to the transport
    ///
    /// # Errors
    /// Returns error if the process cannot be started
    fn connect(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write one framed line to the transport
    ///
    /// # Arguments
    /// * `data` - Line to write, newline included
    ///
    /// # Errors
    /// Returns `AgentError::ClosedTransport` once input has been closed
    fn write(&mut self, data: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// End the input stream (close stdin) without stopping the process
    ///
    /// # Errors
    /// Returns error if closing fails
    fn end_input(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Take the output as a message stream
    ///
    /// The stream ends at end-of-output, on cancellation, or right after a
    /// `result` message. It can be taken once.
    ///
    /// # Errors
    /// Returns `AgentError::AlreadyConsumed` on a second call
    fn read_messages(&mut self, cancel: CancellationToken) -> Result<MessageStream>;

    /// Check if transport is ready for communication
    fn is_ready(&self) -> bool;

    /// Close the transport and clean up resources
    ///
    /// # Errors
    /// Returns error if cleanup fails
    fn close(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub use subprocess::{PromptInput, SubprocessTransport};
