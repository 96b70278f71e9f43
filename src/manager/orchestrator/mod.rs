//! Session orchestrator implementation
//!
//! This module is organized into logical submodules:
//! - `core`: Core struct, registry access, binding and shutdown
//! - `create`: Eager and idle session creation
//! - `interaction`: Send, resume, interrupt, end and control forwards
//! - `info`: Snapshots, listings and subscriptions

mod core;
mod create;
mod info;
mod interaction;

pub use core::SessionOrchestrator;
