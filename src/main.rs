// Command-line driver: run one agent session in the current directory
//
// Usage: agent-session <prompt...>
// Configuration is read from AGENT_* environment variables.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use agent_session_engine::{EventMask, OrchestratorConfig, SessionEvent, SessionOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: agent-session <prompt...>");
    }

    let config = OrchestratorConfig::from_env().context("invalid AGENT_* configuration")?;
    let orchestrator = SessionOrchestrator::new(config);
    let mut events = orchestrator.subscribe(EventMask::all());

    let cwd = std::env::current_dir().context("current directory is not accessible")?;
    let session_id = orchestrator
        .create_session(Arc::new(cwd), prompt, None)
        .await
        .context("failed to start the agent")?;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break None };
                if event.session_id() != &session_id {
                    continue;
                }
                match event {
                    SessionEvent::MessageReceived { message, .. } => {
                        if let Some(text) = message.assistant_text() {
                            println!("{text}");
                        }
                    }
                    SessionEvent::StateChanged { previous, current, .. } => {
                        log::info!("{previous} -> {current}");
                    }
                    SessionEvent::AgentSessionIdLearned { agent_session_id, .. } => {
                        log::info!("agent session {agent_session_id}");
                    }
                    SessionEvent::Ended { state, total_cost, .. } => break Some((state, total_cost)),
                    SessionEvent::Created { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::warn!("Interrupted, stopping the agent");
                orchestrator.interrupt_session(&session_id).await?;
            }
        }
    };

    let snapshot = orchestrator.get_session(&session_id)?;
    orchestrator.shutdown().await;

    if let Some((state, total_cost)) = outcome {
        eprintln!("session {state}, cost ${total_cost:.4}");
    }
    if let Some(agent_session_id) = snapshot.agent_session_id {
        eprintln!("resume with: --resume {agent_session_id}");
    }
    Ok(())
}
