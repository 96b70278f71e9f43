//! End-to-end tests for `SessionOrchestrator` against a scripted agent

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_session_engine::{
    AgentCli, AgentError, EventMask, Message, MessageKind, OrchestratorConfig, SessionEvent,
    SessionHistory, SessionId, SessionOrchestrator, SessionSnapshot, SessionState,
};
use common::{
    AGENT_SESSION_ID, ASSISTANT, Behavior, FakeAgent, INIT, RESULT_COST, RESULT_OK, echo,
    eventually, flag_value, init_logging, wait_for,
};

fn assert_ended_at_matches_state(session: &SessionSnapshot) {
    assert_eq!(
        session.ended_at.is_some(),
        session.state.is_terminal(),
        "state {} with ended_at {:?}",
        session.state,
        session.ended_at
    );
}

fn ended(id: &SessionId) -> impl FnMut(&SessionEvent) -> bool + '_ {
    move |event| matches!(event, SessionEvent::Ended { session_id, .. } if session_id == id)
}

#[tokio::test]
async fn test_eager_session_completes() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::all());

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "say hi", None)
        .await
        .unwrap();

    let created = wait_for(&mut events, |e| matches!(e, SessionEvent::Created { .. })).await;
    let SessionEvent::Created { snapshot } = created else {
        unreachable!()
    };
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.state, SessionState::Starting);
    assert_eq!(snapshot.initial_prompt.as_deref(), Some("say hi"));

    let first = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MessageReceived { .. })
    })
    .await;
    let SessionEvent::MessageReceived { message, .. } = first else {
        unreachable!()
    };
    assert_eq!(
        message.init_session_id().map(|s| s.as_str()),
        Some(AGENT_SESSION_ID)
    );

    let learned = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::AgentSessionIdLearned { .. })
    })
    .await;
    assert_eq!(learned.session_id(), &id);

    let end = wait_for(&mut events, ended(&id)).await;
    let SessionEvent::Ended {
        state, total_cost, ..
    } = end
    else {
        unreachable!()
    };
    assert_eq!(state, SessionState::Completed);
    assert!((total_cost - RESULT_COST).abs() < f64::EPSILON);

    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(
        session.agent_session_id.as_ref().map(|s| s.as_str()),
        Some(AGENT_SESSION_ID)
    );
    assert!((session.total_cost - RESULT_COST).abs() < f64::EPSILON);
    assert_eq!(session.turn_count, 1);
    assert_ended_at_matches_state(&session);

    let kinds: Vec<MessageKind> = session.messages.iter().map(Message::kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::System, MessageKind::Assistant, MessageKind::Result]
    );
    assert!(matches!(
        session.messages.last(),
        Some(Message::Result { is_error: false, .. })
    ));

    let output = orchestrator.last_output(&id, 10).unwrap();
    assert!(output.iter().any(|line| line == "hi there"));
    assert!(orchestrator.list_active().is_empty());

    let runs = agent.invocations();
    assert_eq!(runs.len(), 1);
    assert_eq!(flag_value(&runs[0], "-p"), Some("say hi"));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_idle_session_waits_for_first_turn() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::STATE_CHANGED | EventMask::ENDED);

    let id = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap();

    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::WaitingForInput);
    assert!(session.messages.is_empty());
    assert_ended_at_matches_state(&session);
    assert_eq!(orchestrator.list_active().len(), 1);

    orchestrator.send_message(&id, "hello").await.unwrap();

    let change = wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged { .. })).await;
    let SessionEvent::StateChanged {
        previous, current, ..
    } = change
    else {
        unreachable!()
    };
    assert_eq!(previous, SessionState::WaitingForInput);
    assert_eq!(current, SessionState::Processing);

    wait_for(&mut events, ended(&id)).await;
    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert!(!session.messages.is_empty());

    let stdin = agent.stdin_lines();
    assert_eq!(stdin.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&stdin[0]).unwrap();
    assert_eq!(sent["message"]["content"], "hello");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_interrupt_processing_session() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());

    let id = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap();
    orchestrator.send_message(&id, "work forever").await.unwrap();
    assert_eq!(
        orchestrator.get_session(&id).unwrap().state,
        SessionState::Processing
    );
    assert!(orchestrator.process_running(&id).await.unwrap());

    orchestrator.interrupt_session(&id).await.unwrap();

    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::Cancelled);
    assert_ended_at_matches_state(&session);
    assert!(!orchestrator.process_running(&id).await.unwrap());

    // Already terminal: nothing to do
    orchestrator.interrupt_session(&id).await.unwrap();
    let again = orchestrator.get_session(&id).unwrap();
    assert_eq!(again.state, SessionState::Cancelled);
    assert_eq!(again.ended_at, session.ended_at);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_send_to_completed_session_resumes() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::STATE_CHANGED | EventMask::ENDED);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "first", None)
        .await
        .unwrap();
    wait_for(&mut events, ended(&id)).await;
    let before = orchestrator.get_session(&id).unwrap();
    assert_eq!(before.state, SessionState::Completed);

    orchestrator.send_message(&id, "second").await.unwrap();

    let change = wait_for(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged {
                previous: SessionState::Completed,
                ..
            }
        )
    })
    .await;
    let SessionEvent::StateChanged { current, .. } = change else {
        unreachable!()
    };
    assert_eq!(current, SessionState::Processing);

    wait_for(&mut events, ended(&id)).await;
    let after = orchestrator.get_session(&id).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.state, SessionState::Completed);
    assert!((after.total_cost - 2.0 * RESULT_COST).abs() < 1e-9);
    assert_ended_at_matches_state(&after);
    assert_eq!(orchestrator.list_sessions().len(), 1);

    let runs = agent.invocations();
    assert_eq!(runs.len(), 2);
    assert_eq!(flag_value(&runs[1], "--resume"), Some(AGENT_SESSION_ID));
    assert_eq!(flag_value(&runs[1], "-p"), Some("second"));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_send_without_agent_session_id_is_not_resumable() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Anonymous);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::ENDED);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap();
    wait_for(&mut events, ended(&id)).await;
    let before = orchestrator.get_session(&id).unwrap();
    assert_eq!(before.state, SessionState::Completed);
    assert!(before.agent_session_id.is_none());

    let err = orchestrator.send_message(&id, "again").await.unwrap_err();
    assert!(matches!(err, AgentError::NotResumable(ref s) if s == &id), "{err:?}");
    let err = orchestrator.resume_session(&id).await.unwrap_err();
    assert!(matches!(err, AgentError::NotResumable(_)), "{err:?}");

    let after = orchestrator.get_session(&id).unwrap();
    assert_eq!(after.state, SessionState::Completed);
    assert_eq!(after.ended_at, before.ended_at);
    assert_eq!(agent.invocations().len(), 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_error_result_and_crash_end_in_error() {
    init_logging();
    for behavior in [Behavior::Fails, Behavior::Crashes] {
        let agent = FakeAgent::new(behavior);
        let orchestrator = SessionOrchestrator::new(agent.config());
        let mut events = orchestrator.subscribe(EventMask::ENDED);

        let id = orchestrator
            .create_session(Arc::new(agent.workdir()), "hi", None)
            .await
            .unwrap();
        let end = wait_for(&mut events, ended(&id)).await;
        assert!(
            matches!(end, SessionEvent::Ended { state: SessionState::Error, .. }),
            "{behavior:?}: {end:?}"
        );

        let session = orchestrator.get_session(&id).unwrap();
        assert_eq!(session.state, SessionState::Error);
        assert_ended_at_matches_state(&session);
        // init was seen before the failure either way
        assert!(session.agent_session_id.is_some());

        orchestrator.shutdown().await;
    }
}

#[tokio::test]
async fn test_resume_session_starts_streaming_agent() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::ENDED);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "first", None)
        .await
        .unwrap();
    wait_for(&mut events, ended(&id)).await;

    orchestrator.resume_session(&id).await.unwrap();
    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::Active);
    assert_ended_at_matches_state(&session);

    eventually(|| agent.invocations().len() == 2).await;
    let runs = agent.invocations();
    assert_eq!(flag_value(&runs[1], "--input-format"), Some("stream-json"));
    assert_eq!(flag_value(&runs[1], "--resume"), Some(AGENT_SESSION_ID));

    orchestrator.send_message(&id, "next").await.unwrap();
    wait_for(&mut events, ended(&id)).await;
    assert_eq!(
        orchestrator.get_session(&id).unwrap().state,
        SessionState::Completed
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_idle_session_from_history() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let history = SessionHistory::new("prior-7", vec![Message::user_text("earlier")]);

    let id = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), Some(history))
        .await
        .unwrap();

    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(
        session.agent_session_id.as_ref().map(|s| s.as_str()),
        Some("prior-7")
    );

    eventually(|| !agent.invocations().is_empty()).await;
    assert_eq!(flag_value(&agent.invocations()[0], "--resume"), Some("prior-7"));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_end_session_is_idempotent() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::ENDED);

    let id = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap();

    orchestrator.end_session(&id).await.unwrap();
    let first = orchestrator.get_session(&id).unwrap();
    assert_eq!(first.state, SessionState::Cancelled);
    assert_ended_at_matches_state(&first);
    assert!(!orchestrator.process_running(&id).await.unwrap());

    orchestrator.end_session(&id).await.unwrap();
    let second = orchestrator.get_session(&id).unwrap();
    assert_eq!(second.state, SessionState::Cancelled);
    assert_eq!(second.ended_at, first.ended_at);

    wait_for(&mut events, ended(&id)).await;
    assert!(events.try_recv().is_none());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_end_completed_session_keeps_state() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::ENDED);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap();
    wait_for(&mut events, ended(&id)).await;
    let before = orchestrator.get_session(&id).unwrap();

    orchestrator.end_session(&id).await.unwrap();
    let after = orchestrator.get_session(&id).unwrap();
    assert_eq!(after.state, SessionState::Completed);
    assert_eq!(after.ended_at, before.ended_at);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_remove_session() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());

    let id = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap();
    orchestrator.remove_session(&id).await.unwrap();

    assert!(matches!(
        orchestrator.get_session(&id),
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(orchestrator.list_sessions().is_empty());
}

#[tokio::test]
async fn test_unknown_session() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let id = SessionId::generate();

    assert!(matches!(
        orchestrator.get_session(&id),
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.send_message(&id, "hi").await,
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.interrupt_session(&id).await,
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.end_session(&id).await,
        Err(AgentError::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.last_output(&id, 5),
        Err(AgentError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_launch_failure_registers_nothing() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig::builder()
        .cli(AgentCli::path(dir.path().join("missing-agent")))
        .build();
    let orchestrator = SessionOrchestrator::new(config);
    let mut events = orchestrator.subscribe(EventMask::all());

    let err = orchestrator
        .create_session(Arc::new(dir.path().to_path_buf()), "hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LaunchFailure(_)), "{err:?}");

    let err = orchestrator
        .create_session(Arc::new(dir.path().join("no-such-dir")), "hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LaunchFailure(_)), "{err:?}");

    assert!(orchestrator.list_sessions().is_empty());
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_subscription_mask_and_unsubscribe() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Complete);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut only_ended = orchestrator.subscribe(EventMask::ENDED);
    let dropped = orchestrator.subscribe(EventMask::all());
    orchestrator.unsubscribe(dropped);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap();

    let event = wait_for(&mut only_ended, |_| true).await;
    assert_eq!(event.kind(), EventMask::ENDED);
    assert_eq!(event.session_id(), &id);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_live_sessions() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());

    let eager = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap();
    let idle = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap();
    assert_eq!(orchestrator.list_active().len(), 2);

    orchestrator.shutdown().await;

    for id in [&eager, &idle] {
        let session = orchestrator.get_session(id).unwrap();
        assert_eq!(session.state, SessionState::Cancelled);
        assert_ended_at_matches_state(&session);
        assert!(!orchestrator.process_running(id).await.unwrap());
    }
    assert!(orchestrator.list_active().is_empty());
}

#[tokio::test]
async fn test_create_after_shutdown_is_refused() {
    init_logging();
    let agent = FakeAgent::new(Behavior::Hangs);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::CREATED);

    orchestrator.shutdown().await;
    assert!(orchestrator.is_shut_down());

    let err = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LaunchFailure(_)), "{err:?}");
    let err = orchestrator
        .create_idle_session(Arc::new(agent.workdir()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LaunchFailure(_)), "{err:?}");

    assert!(orchestrator.list_sessions().is_empty());
    assert!(agent.invocations().is_empty());
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_undecodable_output_line_does_not_end_turn() {
    init_logging();
    let body = echo(INIT)
        + r"printf '\377\376 not utf8\n'"
        + "\n"
        + &echo(ASSISTANT)
        + &echo(RESULT_OK);
    let agent = FakeAgent::scripted(&body);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::ENDED);

    let id = orchestrator
        .create_session(Arc::new(agent.workdir()), "hi", None)
        .await
        .unwrap();
    wait_for(&mut events, ended(&id)).await;

    let session = orchestrator.get_session(&id).unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert!((session.total_cost - RESULT_COST).abs() < f64::EPSILON);
    let kinds: Vec<MessageKind> = session.messages.iter().map(Message::kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::System, MessageKind::Assistant, MessageKind::Result]
    );

    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupted_session_records_nothing_after_ended() {
    init_logging();
    let body = format!(
        "i=0\nwhile [ $i -lt 200 ]; do\n{}i=$((i + 1))\ndone\nsleep 30\n",
        echo(INIT)
    );
    let agent = FakeAgent::scripted(&body);
    let orchestrator = SessionOrchestrator::new(agent.config());
    let mut events = orchestrator.subscribe(EventMask::all());

    for round in 0..20u64 {
        let id = orchestrator
            .create_session(Arc::new(agent.workdir()), "hi", None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(round % 5)).await;
        orchestrator.interrupt_session(&id).await.unwrap();
        let recorded = orchestrator.get_session(&id).unwrap().messages.len();

        // Every event for the session was emitted before the interrupt returned
        let mut received = 0;
        let mut saw_ended = false;
        while let Some(event) = events.try_recv() {
            if event.session_id() != &id {
                continue;
            }
            assert!(!saw_ended, "{event:?} arrived after Ended");
            match event {
                SessionEvent::Ended { state, .. } => {
                    assert_eq!(state, SessionState::Cancelled);
                    saw_ended = true;
                }
                SessionEvent::MessageReceived { .. } => received += 1,
                _ => {}
            }
        }
        assert!(saw_ended);
        assert_eq!(received, recorded);

        tokio::time::sleep(Duration::from_millis(30)).await;
        while let Some(event) = events.try_recv() {
            assert_ne!(event.session_id(), &id, "{event:?} arrived after Ended");
        }
        let session = orchestrator.get_session(&id).unwrap();
        assert_eq!(session.state, SessionState::Cancelled);
        assert_eq!(session.messages.len(), recorded);
        assert_ended_at_matches_state(&session);
    }

    orchestrator.shutdown().await;
}
