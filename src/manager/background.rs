//! Background read loop for a bound query
//!
//! One task per binding drains the query's message stream into the session
//! record and raises events. It only touches the record while its binding
//! generation is current, so a replaced query can never write to a rebound
//! session.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::query::Query;
use crate::types::messages::Message;

use super::events::{EventBus, SessionEvent};
use super::session::{Session, SessionEntry, SessionState, Tracked};

/// Shared state for one read loop
pub(super) struct LoopContext {
    pub entry: Arc<SessionEntry>,
    pub query: Arc<Query>,
    pub generation: u64,
    pub events: EventBus,
    pub shutdown: CancellationToken,
}

/// How a read loop finished
enum LoopEnd {
    /// A `result` closed the turn
    Result,
    /// Iteration was cancelled
    Cancelled,
    /// Output ended without a `result`
    EndOfStream,
    /// The stream failed
    Fault(AgentError),
    /// The binding was replaced while reading
    Stale,
}

/// Spawn the read loop for a binding
///
/// The task runs until the turn's `result`, end of output, a fault, or
/// cancellation, and always leaves a current session terminal when it stops
/// for any reason other than a result.
pub(super) fn spawn_read_loop(ctx: LoopContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let end = read_messages(&ctx).await;
        let session_id = ctx.entry.tracked.read().session.id.clone();

        let next = match end {
            LoopEnd::Result | LoopEnd::Stale => None,
            LoopEnd::Cancelled => Some(SessionState::Cancelled),
            LoopEnd::EndOfStream => {
                log::warn!("[{session_id}] Agent output ended without a result");
                Some(SessionState::Error)
            }
            LoopEnd::Fault(e) => {
                log::error!("[{session_id}] Read loop failed: {e}");
                Some(SessionState::Error)
            }
        };

        if let Some(next) = next {
            update_if_current(&ctx, |tracked| {
                let mut changes = Changes::default();
                changes.transition(&mut tracked.session, next);
                changes
            });
        }
        log::debug!("[{session_id}] Read loop finished");
    })
}

async fn read_messages(ctx: &LoopContext) -> LoopEnd {
    let mut stream = match ctx.query.messages(&ctx.shutdown).await {
        Ok(stream) => stream,
        Err(e) => return LoopEnd::Fault(e),
    };

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => return LoopEnd::Fault(e),
        };

        let ends_turn = message.is_result();
        if !update_if_current(ctx, |tracked| apply_message(tracked, message)) {
            return LoopEnd::Stale;
        }

        if ends_turn {
            // Let an idle streaming agent exit on its own
            if let Err(e) = ctx.query.close_input().await {
                log::debug!("Closing agent input after result failed: {e}");
            }
            return LoopEnd::Result;
        }
    }

    if ctx.query.is_cancelled() || ctx.shutdown.is_cancelled() {
        LoopEnd::Cancelled
    } else {
        LoopEnd::EndOfStream
    }
}

/// Events produced by one record update
#[derive(Default)]
struct Changes {
    events: Vec<SessionEvent>,
}

impl Changes {
    fn transition(&mut self, session: &mut Session, next: SessionState) {
        let Some(previous) = session.transition(next) else {
            return;
        };
        log::info!("[{}] {previous} -> {next}", session.id);
        self.events.push(SessionEvent::StateChanged {
            session_id: session.id.clone(),
            previous,
            current: next,
        });
        if next.is_terminal() {
            self.events.push(SessionEvent::Ended {
                session_id: session.id.clone(),
                state: next,
                ended_at: session.ended_at,
                total_cost: session.total_cost,
            });
        }
    }
}

/// Run `f` on the record if the binding is still current
///
/// Events are emitted before the record lock is released, so subscribers see
/// them in the same order as the record changed. Returns `false` when the
/// binding has been replaced or detached.
fn update_if_current(ctx: &LoopContext, f: impl FnOnce(&mut Tracked) -> Changes) -> bool {
    let mut tracked = ctx.entry.tracked.write();
    if tracked.generation != ctx.generation {
        return false;
    }

    for event in f(&mut tracked).events {
        ctx.events.emit(event);
    }
    true
}

fn apply_message(tracked: &mut Tracked, message: Message) -> Changes {
    let session = &mut tracked.session;
    let mut changes = Changes::default();
    session.last_activity_at = Utc::now();

    changes.events.push(SessionEvent::MessageReceived {
        session_id: session.id.clone(),
        message: Box::new(message.clone()),
    });

    if let Some(id) = message.init_session_id() {
        if session.agent_session_id.as_ref() != Some(id) {
            log::info!("[{}] Agent session id learned: {id}", session.id);
            session.agent_session_id = Some(id.clone());
            changes.events.push(SessionEvent::AgentSessionIdLearned {
                session_id: session.id.clone(),
                agent_session_id: id.clone(),
            });
        }
        if !session.state.is_terminal() {
            changes.transition(session, SessionState::Active);
        }
    }

    if let Message::Result {
        is_error,
        num_turns,
        total_cost_usd,
        ..
    } = &message
    {
        session.total_cost += total_cost_usd.unwrap_or(0.0).max(0.0);
        session.turn_count = *num_turns;
        let next = if *is_error {
            SessionState::Error
        } else {
            SessionState::Completed
        };
        changes.transition(session, next);
    }

    session.messages.push(message);
    changes
}
