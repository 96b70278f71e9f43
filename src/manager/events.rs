//! Session lifecycle events and subscriptions
//!
//! Subscribers register with a kind mask and receive matching events over an
//! unbounded channel. Dropping the [`Subscription`] unsubscribes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::identifiers::{AgentSessionId, SessionId};
use crate::types::messages::Message;

use super::session::{SessionSnapshot, SessionState};

bitflags! {
    /// Event kinds a subscriber wants
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        /// `SessionEvent::Created`
        const CREATED = 1 << 0;
        /// `SessionEvent::MessageReceived`
        const MESSAGE = 1 << 1;
        /// `SessionEvent::StateChanged`
        const STATE_CHANGED = 1 << 2;
        /// `SessionEvent::Ended`
        const ENDED = 1 << 3;
        /// `SessionEvent::AgentSessionIdLearned`
        const AGENT_SESSION_ID = 1 << 4;
    }
}

/// Lifecycle notification
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was registered
    Created {
        /// Session as first registered
        snapshot: Box<SessionSnapshot>,
    },
    /// The agent produced a message
    MessageReceived {
        /// Session the message belongs to
        session_id: SessionId,
        /// Decoded message
        message: Box<Message>,
    },
    /// The session changed state
    StateChanged {
        /// Affected session
        session_id: SessionId,
        /// State before
        previous: SessionState,
        /// State after
        current: SessionState,
    },
    /// The session entered a terminal state
    Ended {
        /// Affected session
        session_id: SessionId,
        /// Terminal state
        state: SessionState,
        /// When it ended
        ended_at: Option<DateTime<Utc>>,
        /// Accumulated cost in USD
        total_cost: f64,
    },
    /// The agent assigned (or changed) its session id
    AgentSessionIdLearned {
        /// Affected session
        session_id: SessionId,
        /// Agent-assigned id
        agent_session_id: AgentSessionId,
    },
}

impl SessionEvent {
    /// Mask bit of this event
    #[must_use]
    pub const fn kind(&self) -> EventMask {
        match self {
            Self::Created { .. } => EventMask::CREATED,
            Self::MessageReceived { .. } => EventMask::MESSAGE,
            Self::StateChanged { .. } => EventMask::STATE_CHANGED,
            Self::Ended { .. } => EventMask::ENDED,
            Self::AgentSessionIdLearned { .. } => EventMask::AGENT_SESSION_ID,
        }
    }

    /// Session this event is about
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Created { snapshot } => &snapshot.id,
            Self::MessageReceived { session_id, .. }
            | Self::StateChanged { session_id, .. }
            | Self::Ended { session_id, .. }
            | Self::AgentSessionIdLearned { session_id, .. } => session_id,
        }
    }
}

struct Subscriber {
    id: u64,
    mask: EventMask,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

type Subscribers = Mutex<Vec<Subscriber>>;

/// Fan-out of session events to subscribers
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn subscribe(&self, mask: EventMask) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { id, mask, tx });

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver to every interested subscriber, dropping closed ones
    pub fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        self.subscribers
            .lock()
            .retain(|s| !s.mask.intersects(kind) || s.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving end of an event subscription
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    bus: Weak<Subscribers>,
}

impl Subscription {
    /// Wait for the next event; `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn detach(&self) {
        if let Some(subscribers) = self.bus.upgrade() {
            subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}
