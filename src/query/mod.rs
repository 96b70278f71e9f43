//! One conversation with one agent process
//!
//! A [`Query`] wraps a connected transport. Output is read through a
//! single-pass [`MessageStream`](crate::transport::MessageStream); turns and
//! control commands are written through `&self` methods, so a read loop and
//! the host can share one `Arc<Query>`.
//!
//! ```no_run
//! use agent_session_engine::{AgentOptions, PromptInput, Query};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let query = Query::spawn("claude", PromptInput::from("What is 2 + 2?"), AgentOptions::default()).await?;
//! let mut messages = query.messages(&CancellationToken::new()).await?;
//!
//! while let Some(message) = messages.next().await {
//!     if let Some(text) = message?.assistant_text() {
//!         println!("{text}");
//!     }
//! }
//! query.dispose().await?;
//! # Ok(())
//! # }
//! ```

mod query_impl;

pub use query_impl::Query;
