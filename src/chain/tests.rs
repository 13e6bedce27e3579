use super::*;
use crate::process::ProcessStatus;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_single_command_success() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo hello").await;
    assert!(result.success);
    assert_eq!(result.output, "hello");
}

#[tokio::test]
async fn test_single_command_failure_uses_stderr() {
    let executor = ChainExecutor::new();
    let result = executor.execute("ls /definitely/not/a/path").await;
    assert!(!result.success);
    assert!(!result.output.is_empty());
}

#[tokio::test]
async fn test_single_command_nonzero_exit() {
    let executor = ChainExecutor::new();
    let result = executor.execute("exit 3").await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_single_command_timeout_kills() {
    let executor = ChainExecutor::with_config(ChainConfig {
        command_timeout_secs: 1,
        ..ChainConfig::default()
    });
    let start = Instant::now();
    let result = executor.execute("sleep 5").await;
    assert!(!result.success);
    assert!(result.output.contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_sequential_runs_everything() {
    let executor = ChainExecutor::new();
    let result = executor.execute("false; echo after").await;
    assert!(result.success);
    assert!(result.output.contains("[false]"));
    assert!(result.output.contains("[echo after] -> after"));
}

#[tokio::test]
async fn test_sequential_segment_count_and_order() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo one; echo two; echo three").await;
    assert!(result.success);
    let segments: Vec<&str> = result.output.lines().collect();
    assert_eq!(segments.len(), 3);
    assert!(segments[0].contains("one"));
    assert!(segments[1].contains("two"));
    assert!(segments[2].contains("three"));
}

#[tokio::test]
async fn test_and_chain_stops_at_failure() {
    let executor = ChainExecutor::new();
    let result = executor.execute("false && echo never").await;
    assert!(!result.success);
    assert!(result.output.contains("Chain stopped due to failure"));
    assert!(!result.output.contains("never"));
}

#[tokio::test]
async fn test_and_chain_stops_after_second_of_three() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo ok && false && echo never").await;
    assert!(!result.success);
    assert!(result.output.contains("[echo ok] -> ok"));
    assert!(result.output.contains("[false]"));
    assert!(!result.output.contains("never"));
}

#[tokio::test]
async fn test_and_chain_all_succeed() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo a && echo b").await;
    assert!(result.success);
    assert!(result.output.contains("[echo a] -> a"));
    assert!(result.output.contains("[echo b] -> b"));
}

#[tokio::test]
async fn test_or_chain_short_circuits() {
    let executor = ChainExecutor::new();
    let result = executor.execute("true || echo never").await;
    assert!(result.success);
    assert!(result.output.contains("Chain succeeded"));
    assert!(!result.output.contains("never"));
}

#[tokio::test]
async fn test_or_chain_stops_after_first_success() {
    let executor = ChainExecutor::new();
    let result = executor.execute("false || echo hi || echo bye").await;
    assert!(result.success);
    assert!(result.output.contains("[false]"));
    assert!(result.output.contains("[echo hi] -> hi"));
    assert!(!result.output.contains("bye"));
}

#[tokio::test]
async fn test_or_chain_all_fail() {
    let executor = ChainExecutor::new();
    let result = executor.execute("false || ls /nope/nope").await;
    assert!(!result.success);
    assert!(result.output.contains("All commands failed"));
}

#[tokio::test]
async fn test_pipe_two_stages() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo hi | tr a-z A-Z").await;
    assert!(result.success);
    assert_eq!(result.output, "HI");
}

#[tokio::test]
async fn test_pipe_three_stages() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo hello | tr a-z A-Z | tr L X").await;
    assert!(result.success);
    assert_eq!(result.output, "HEXXO");
}

#[tokio::test]
async fn test_pipe_fails_when_any_stage_fails() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo hi | false").await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_pipe_timeout() {
    let executor = ChainExecutor::with_config(ChainConfig {
        command_timeout_secs: 1,
        ..ChainConfig::default()
    });
    let start = Instant::now();
    let result = executor.execute("sleep 5 | cat").await;
    assert!(!result.success);
    assert!(result.output.contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_operators_nest_through_recursion() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo a && echo b | tr a-z A-Z").await;
    assert!(result.success);
    assert!(result.output.contains("[echo a] -> a"));
    assert!(result.output.contains("B"));
}

#[tokio::test]
async fn test_background_returns_immediately() {
    let executor = ChainExecutor::new();
    let start = Instant::now();
    let result = executor.execute("sleep 5 &").await;
    assert!(result.success);
    assert!(start.elapsed() < Duration::from_millis(500));

    let id = result.output.clone();
    let record = executor.processes().status(&id).expect("registered");
    assert_eq!(record.status, ProcessStatus::Running);
    assert!(executor.processes().kill(&id));
}

#[tokio::test]
async fn test_background_reaches_terminal_status_with_output() {
    let executor = ChainExecutor::new();
    let result = executor.execute("echo from_background &").await;
    assert!(result.success);
    let id = result.output.clone();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let record = executor.processes().status(&id).expect("registered");
    assert_eq!(record.status, ProcessStatus::Completed);
    assert!(record.stdout.unwrap_or_default().contains("from_background"));
}

#[tokio::test]
async fn test_history_records_submitted_chains() {
    let executor = ChainExecutor::new();
    executor.execute("echo one").await;
    executor.execute("echo two; echo three").await;

    let history = executor.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].command, "echo one");
    assert_eq!(history[1].command, "echo two; echo three");
}

#[tokio::test]
async fn test_bare_pipe_is_rejected_without_panic() {
    let executor = ChainExecutor::new();
    let result = executor.execute("|").await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_empty_expression_is_harmless() {
    let executor = ChainExecutor::new();
    let result = executor.execute("").await;
    assert!(result.success);
    assert_eq!(result.output, "");
}
