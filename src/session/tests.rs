use super::*;
use crate::config::SessionConfig;
use std::time::Duration;

fn fast_config() -> SessionConfig {
    SessionConfig {
        connect_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_create_assigns_monotonic_ids() {
    let manager = SessionManager::new();
    assert_eq!(manager.create("cat", None), "interactive_1");
    assert_eq!(manager.create("cat", None), "interactive_2");
}

#[tokio::test]
async fn test_ids_not_reused_after_close() {
    let manager = SessionManager::new();
    let id = manager.create("cat", None);
    manager.close(&id).await;
    assert_eq!(manager.create("cat", None), "interactive_2");
}

#[tokio::test]
async fn test_session_type_detection_on_create() {
    let manager = SessionManager::new();
    let id = manager.create("ssh user@somewhere", None);
    let status = manager.status(&id).expect("created");
    assert_eq!(status.session_type, SessionType::Ssh);
    assert_eq!(status.state, SessionState::Idle);
}

#[tokio::test]
async fn test_explicit_type_overrides_detection() {
    let manager = SessionManager::new();
    let id = manager.create("ssh user@somewhere", Some(SessionType::Generic));
    let status = manager.status(&id).expect("created");
    assert_eq!(status.session_type, SessionType::Generic);
}

#[tokio::test]
async fn test_connect_on_success_phrase() {
    let manager = SessionManager::with_config(fast_config());
    let id = manager.create("echo connected; cat", None);
    assert!(manager.start(&id).await);
    let status = manager.status(&id).expect("created");
    assert_eq!(status.state, SessionState::Connected);
    manager.close(&id).await;
}

#[tokio::test]
async fn test_connect_failure_phrase_gives_error_state() {
    let manager = SessionManager::with_config(fast_config());
    let id = manager.create("echo Connection refused", None);
    assert!(!manager.start(&id).await);
    let status = manager.status(&id).expect("created");
    assert_eq!(status.state, SessionState::Error);
    assert!(status
        .context
        .last_error
        .unwrap_or_default()
        .to_lowercase()
        .contains("refused"));
}

#[tokio::test]
async fn test_connect_timeout_gives_error_state() {
    let manager = SessionManager::with_config(SessionConfig {
        connect_timeout_secs: 1,
        ..SessionConfig::default()
    });
    // Never prints anything recognizable
    let id = manager.create("sleep 30", None);
    assert!(!manager.start(&id).await);
    assert_eq!(
        manager.status(&id).expect("created").state,
        SessionState::Error
    );
}

#[tokio::test]
async fn test_send_and_get_output_round_trip() {
    let manager = SessionManager::with_config(fast_config());
    let id = manager.create("echo connected; cat", None);
    assert!(manager.start(&id).await);

    assert!(manager.send(&id, "hello session").await);
    let lines = manager.output(&id, Duration::from_secs(3)).await;
    assert_eq!(lines, vec!["hello session".to_string()]);
    manager.close(&id).await;
}

#[tokio::test]
async fn test_send_requires_connected_state() {
    let manager = SessionManager::new();
    let id = manager.create("cat", None);
    // Never started: still IDLE
    assert!(!manager.send(&id, "too early").await);
}

#[tokio::test]
async fn test_unknown_ids_answer_with_sentinels() {
    let manager = SessionManager::new();
    assert!(!manager.start("interactive_999").await);
    assert!(!manager.send("interactive_999", "hi").await);
    assert!(manager
        .output("interactive_999", Duration::from_millis(50))
        .await
        .is_empty());
    assert!(manager.status("interactive_999").is_none());
    assert!(!manager.close("interactive_999").await);
}

#[tokio::test]
async fn test_close_evicts_from_registry() {
    let manager = SessionManager::with_config(fast_config());
    let id = manager.create("echo connected; cat", None);
    assert!(manager.start(&id).await);

    assert!(manager.close(&id).await);
    assert!(manager.status(&id).is_none());
    assert!(manager.list().iter().all(|s| s.session_id != id));
    assert!(!manager.send(&id, "gone").await);
}

#[tokio::test]
async fn test_close_is_idempotent_at_session_level() {
    let session = InteractiveSession::new(
        "s1",
        "echo connected; cat",
        SessionType::Generic,
        fast_config(),
    );
    assert!(session.start().await);
    assert!(session.close().await);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.close().await);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_monitor_detects_process_end() {
    let session = InteractiveSession::new(
        "s1",
        "echo connected",
        SessionType::Generic,
        fast_config(),
    );
    assert!(session.start().await);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(
        session.status().context.disconnect_reason.as_deref(),
        Some("process_ended")
    );
}

#[tokio::test]
async fn test_monitor_detects_idle_timeout() {
    let session = InteractiveSession::new(
        "s1",
        "echo connected; cat",
        SessionType::Generic,
        SessionConfig {
            connect_timeout_secs: 5,
            idle_timeout_secs: 1,
            ..SessionConfig::default()
        },
    );
    assert!(session.start().await);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(
        session.status().context.disconnect_reason.as_deref(),
        Some("timeout")
    );
    session.close().await;
}

#[tokio::test]
async fn test_stderr_channel_stays_independent() {
    let session = InteractiveSession::new(
        "s1",
        "echo connected; sleep 1; echo oops 1>&2; cat",
        SessionType::Generic,
        fast_config(),
    );
    assert!(session.start().await);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let stderr = session.take_stderr().await;
    assert_eq!(stderr, vec!["oops".to_string()]);
    // Nothing leaked onto the stdout channel
    assert!(session.get_output(Duration::from_millis(200)).await.is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_transcript_and_history_accumulate() {
    let session = InteractiveSession::new(
        "s1",
        "echo connected; cat",
        SessionType::Generic,
        fast_config(),
    );
    assert!(session.start().await);
    assert!(session.send_input("first").await);
    assert!(session.send_input("second").await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = session.status();
    let history: Vec<&str> = status
        .context
        .command_history
        .iter()
        .map(|r| r.command.as_str())
        .collect();
    assert_eq!(history, vec!["first", "second"]);
    assert!(status
        .context
        .transcript
        .iter()
        .any(|entry| entry.kind == TranscriptKind::Output && entry.content == "connected"));
    assert_eq!(status.context.last_prompt.as_deref(), Some("connected"));
    session.close().await;
}

#[tokio::test]
async fn test_cleanup_idle_evicts_only_stale_sessions() {
    let manager = SessionManager::new();
    let stale_a = manager.create("cat", None);
    let stale_b = manager.create("cat", None);
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let fresh = manager.create("cat", None);

    let evicted = manager.cleanup_idle(Duration::from_secs(1)).await;
    assert_eq!(evicted, 2);
    assert!(manager.status(&stale_a).is_none());
    assert!(manager.status(&stale_b).is_none());
    assert!(manager.status(&fresh).is_some());
    assert_eq!(manager.list().len(), 1);
}

#[tokio::test]
async fn test_close_all_empties_registry() {
    let manager = SessionManager::new();
    manager.create("cat", None);
    manager.create("cat", None);
    manager.close_all().await;
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let manager = SessionManager::with_config(fast_config());
    let id = manager.create("echo connected; cat", None);
    assert!(manager.start(&id).await);
    assert!(!manager.start(&id).await);
    manager.close(&id).await;
}
