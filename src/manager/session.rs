//! Session state structures
//!
//! Defines the host-visible session record, its state machine and the
//! registry entry that pairs a record with its bound [`Query`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::query::Query;
use crate::types::context::WorkingContext;
use crate::types::identifiers::{AgentSessionId, SessionId};
use crate::types::messages::Message;

// ============================================================================
// State Machine
// ============================================================================

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Process launched, no `init` seen yet
    Starting,
    /// Agent announced itself
    Active,
    /// A turn is in flight
    Processing,
    /// Idle, waiting for the host to send a turn
    WaitingForInput,
    /// Last turn finished successfully
    Completed,
    /// Last turn failed or the process died
    Error,
    /// Stopped by the host
    Cancelled,
}

impl SessionState {
    /// Whether no process is expected to be working for this session
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether `next` is a legal ordinary transition
    ///
    /// Leaving a terminal state only happens through a rebind.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Active, Cancelled, Completed, Error, Processing, Starting, WaitingForInput};

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Completed | Error | Cancelled)
                | (Starting | Processing | WaitingForInput, Active)
                | (Starting | Active | WaitingForInput, Processing)
                | (Active, WaitingForInput)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::WaitingForInput => "waiting_for_input",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Session Record
// ============================================================================

/// Host-visible record of one conversation
#[derive(Debug, Clone)]
pub struct Session {
    /// Engine-generated identifier, stable for the conversation
    pub id: SessionId,
    /// Agent-assigned identifier, once learned
    pub agent_session_id: Option<AgentSessionId>,
    /// Working directory context, owned by the host
    pub context: Arc<dyn WorkingContext>,
    /// Current lifecycle state
    pub state: SessionState,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last entered a terminal state
    pub ended_at: Option<DateTime<Utc>>,
    /// When the last message arrived
    pub last_activity_at: DateTime<Utc>,
    /// Accumulated cost in USD over every turn
    pub total_cost: f64,
    /// Turn count reported by the last result
    pub turn_count: u32,
    /// Every protocol message seen, in arrival order
    pub messages: Vec<Message>,
    /// Prompt the session was created with, for eager sessions
    pub initial_prompt: Option<String>,
}

/// Copy-on-read view of a session handed to the host
pub type SessionSnapshot = Session;

impl Session {
    pub(super) fn new(
        id: SessionId,
        context: Arc<dyn WorkingContext>,
        state: SessionState,
        initial_prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_session_id: None,
            context,
            state,
            created_at: now,
            ended_at: None,
            last_activity_at: now,
            total_cost: 0.0,
            turn_count: 0,
            messages: Vec::new(),
            initial_prompt,
        }
    }

    /// Apply an ordinary transition
    ///
    /// Returns the previous state when the state changed. Self-transitions
    /// are no-ops; illegal ones are refused and logged.
    pub(super) fn transition(&mut self, next: SessionState) -> Option<SessionState> {
        if self.state == next {
            return None;
        }
        if !self.state.can_transition_to(next) {
            log::warn!(
                "[{}] Refusing transition {} -> {next}",
                self.id,
                self.state
            );
            return None;
        }
        Some(self.enter(next))
    }

    /// Move onto a fresh binding, leaving any terminal state
    pub(super) fn rebind(&mut self, next: SessionState) -> Option<SessionState> {
        if self.state == next {
            return None;
        }
        Some(self.enter(next))
    }

    fn enter(&mut self, next: SessionState) -> SessionState {
        let previous = std::mem::replace(&mut self.state, next);
        if next.is_terminal() {
            if !previous.is_terminal() {
                self.ended_at = Some(Utc::now());
            }
        } else {
            self.ended_at = None;
        }
        previous
    }
}

// ============================================================================
// Registry Entry
// ============================================================================

/// Query currently bound to a session
pub(super) struct Binding {
    pub query: Arc<Query>,
    pub read_loop: Option<JoinHandle<()>>,
}

/// Record plus the generation of the binding allowed to mutate it
pub(super) struct Tracked {
    pub session: Session,
    pub generation: u64,
}

/// Registry slot for one session
pub(super) struct SessionEntry {
    pub tracked: RwLock<Tracked>,
    pub binding: SyncMutex<Option<Binding>>,
    /// Serializes send, resume, interrupt and end
    pub op_lock: Mutex<()>,
}

impl SessionEntry {
    pub fn new(session: Session) -> Self {
        Self {
            tracked: RwLock::new(Tracked {
                session,
                generation: 0,
            }),
            binding: SyncMutex::new(None),
            op_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.tracked.read().session.clone()
    }

    pub fn state(&self) -> SessionState {
        self.tracked.read().session.state
    }

    pub fn generation(&self) -> u64 {
        self.tracked.read().generation
    }

    pub fn query(&self) -> Option<Arc<Query>> {
        self.binding.lock().as_ref().map(|b| Arc::clone(&b.query))
    }

    /// Detach the current binding and invalidate its read loop
    pub fn unbind(&self) -> Option<Binding> {
        let binding = self.binding.lock().take();
        self.tracked.write().generation += 1;
        binding
    }
}
