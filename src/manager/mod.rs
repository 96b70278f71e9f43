//! Session orchestration
//!
//! Provides [`SessionOrchestrator`] for creating, driving and tearing down
//! many concurrent agent sessions, with a per-session state machine and
//! lifecycle events.
//!
//! # Module Structure
//!
//! - `orchestrator` - Core `SessionOrchestrator` with public API
//! - `session` - Session record, state machine and registry entry
//! - `events` - Lifecycle events and subscriptions
//! - `background` - Per-binding read loop
//! - `helpers` - Pure helper functions for transcripts

mod background;
mod events;
mod helpers;
mod orchestrator;
mod session;

pub use events::{EventMask, SessionEvent, Subscription};
pub use orchestrator::SessionOrchestrator;
pub use session::{Session, SessionSnapshot, SessionState};
