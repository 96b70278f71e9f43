//! Core orchestrator structure and lifecycle management

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::error::{AgentError, Result};
use crate::query::Query;
use crate::transport::PromptInput;
use crate::types::context::WorkingContext;
use crate::types::identifiers::SessionId;
use crate::types::options::AgentOptions;

use super::super::background::{LoopContext, spawn_read_loop};
use super::super::events::{EventBus, SessionEvent};
use super::super::session::{Binding, SessionEntry, SessionState};

/// Manager for many concurrent agent sessions
///
/// The orchestrator coordinates:
/// - a registry of sessions keyed by [`SessionId`]
/// - one bound [`Query`] per session, swapped on resume
/// - a read loop per binding that keeps the record current
/// - lifecycle events for subscribers
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct SessionOrchestrator {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub config: OrchestratorConfig,
    pub registry: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    pub events: EventBus,
    pub shutdown: CancellationToken,
}

impl SessionOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: RwLock::new(HashMap::new()),
                events: EventBus::default(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub(super) fn entry(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>> {
        self.inner
            .registry
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AgentError::session_not_found(session_id))
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        self.inner.events.emit(event);
    }

    /// Options for a launch: per-call overrides, then the context, then defaults
    pub(super) fn launch_options(
        &self,
        context: &dyn WorkingContext,
        overrides: Option<AgentOptions>,
    ) -> AgentOptions {
        let mut options = overrides.unwrap_or_default();
        if options.cwd.is_none() {
            options.cwd = Some(context.root().to_path_buf());
        }
        options.with_defaults(&self.inner.config.defaults)
    }

    /// Resolve the executable and start a query
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` once the orchestrator is shut down
    pub(super) async fn launch(&self, prompt: PromptInput, options: AgentOptions) -> Result<Query> {
        if self.is_shut_down() {
            return Err(AgentError::launch_failure("session orchestrator is shut down"));
        }
        let cli = self.inner.config.cli.resolve()?;
        Query::spawn_with_grace(cli, prompt, options, self.inner.config.shutdown_grace).await
    }

    /// Install a query on an entry, optionally starting its read loop
    ///
    /// Callers hold the entry's operation lock and have already unbound
    /// (and disposed) any previous query.
    pub(super) fn bind(
        &self,
        entry: &Arc<SessionEntry>,
        query: Query,
        next: SessionState,
        start_reading: bool,
    ) {
        let query = Arc::new(query);
        let generation = {
            let mut tracked = entry.tracked.write();
            tracked.generation += 1;
            if let Some(previous) = tracked.session.rebind(next) {
                let session_id = tracked.session.id.clone();
                log::info!("[{session_id}] {previous} -> {next} (rebound)");
                self.emit(SessionEvent::StateChanged {
                    session_id,
                    previous,
                    current: next,
                });
            }
            tracked.generation
        };

        let read_loop = start_reading.then(|| self.start_read_loop(entry, &query, generation));
        *entry.binding.lock() = Some(Binding { query, read_loop });
    }

    pub(super) fn start_read_loop(
        &self,
        entry: &Arc<SessionEntry>,
        query: &Arc<Query>,
        generation: u64,
    ) -> tokio::task::JoinHandle<()> {
        spawn_read_loop(LoopContext {
            entry: Arc::clone(entry),
            query: Arc::clone(query),
            generation,
            events: self.inner.events.clone(),
            shutdown: self.inner.shutdown.clone(),
        })
    }

    /// Detach and tear down the current binding, if any
    pub(super) async fn release(&self, entry: &SessionEntry) {
        let Some(binding) = entry.unbind() else {
            return;
        };
        if let Err(e) = binding.query.dispose().await {
            log::warn!("Failed to dispose agent process: {e}");
        }
        if let Some(task) = binding.read_loop {
            task.abort();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Cancel every read loop and dispose every query
    ///
    /// Live sessions end as `Cancelled`. The orchestrator stays usable for
    /// lookups afterwards; new sessions and resumes are refused.
    pub async fn shutdown(&self) {
        log::info!("Shutting down session orchestrator...");
        self.inner.shutdown.cancel();

        let session_ids: Vec<SessionId> = self.inner.registry.read().keys().cloned().collect();
        for session_id in session_ids {
            log::debug!("Ending session: {session_id}");
            if let Err(e) = self.end_session(&session_id).await {
                log::warn!("Failed to end session {session_id}: {e}");
            }
        }

        log::info!("Session orchestrator shutdown complete");
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("sessions", &self.inner.registry.read().len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
