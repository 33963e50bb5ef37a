#![cfg(unix)]

use fanout_agent::backends::direct_cli::{DirectCliBackend, DirectCliConfig};
use fanout_agent::{AgentEvent, AgentRequest, PromptMode};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sh_backend(script: &str) -> DirectCliBackend {
    sh_backend_in(script, Path::new("."))
}

fn sh_backend_in(script: &str, dir: &Path) -> DirectCliBackend {
    DirectCliBackend::new(DirectCliConfig {
        binary: "sh".to_string(),
        working_dir: dir.to_path_buf(),
        query_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        execute_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        model_flag: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_direct_cli_streams_stdout_as_content() {
    let handle = sh_backend("echo \"got: $1\"; echo second").into_handle();
    let response = handle
        .prompt(&AgentRequest::new("hello"), PromptMode::Query)
        .await
        .unwrap()
        .into_response("sh")
        .await;

    assert!(response.success, "{:?}", response);
    assert_eq!(response.content, "got: hello\nsecond");
    assert_eq!(response.metadata["exit_code"], 0);
}

#[tokio::test]
async fn test_direct_cli_nonzero_exit_is_failure() {
    let handle = sh_backend("echo broken >&2; exit 3").into_handle();
    let response = handle
        .prompt(&AgentRequest::new("x"), PromptMode::Execute)
        .await
        .unwrap()
        .into_response("sh")
        .await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.contains("Some(3)"), "{}", error);
    assert!(error.contains("broken"), "{}", error);
}

#[tokio::test]
async fn test_direct_cli_missing_binary_is_failure() {
    let handle = DirectCliBackend::new(DirectCliConfig {
        binary: "/definitely/not/a/binary".to_string(),
        working_dir: PathBuf::from("."),
        query_args: vec![],
        execute_args: vec![],
        model_flag: None,
    })
    .unwrap()
    .into_handle();

    let response = handle
        .prompt(&AgentRequest::new("x"), PromptMode::Query)
        .await
        .unwrap()
        .into_response("missing")
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("Failed to spawn"));
}

#[tokio::test]
async fn test_direct_cli_request_timeout() {
    let handle = sh_backend("sleep 5").into_handle();
    let response = handle
        .prompt(&AgentRequest::new("x").with_timeout_ms(100), PromptMode::Query)
        .await
        .unwrap()
        .into_response("sh")
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_direct_cli_runs_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "found").unwrap();

    let handle = sh_backend_in("cat marker.txt", dir.path()).into_handle();
    let response = handle
        .prompt(&AgentRequest::new("x"), PromptMode::Query)
        .await
        .unwrap()
        .into_response("sh")
        .await;

    assert!(response.success, "{:?}", response);
    assert_eq!(response.content, "found");
}

/// Poll `kill -0` until the process is gone
async fn wait_for_exit(pid: &str) -> bool {
    for _ in 0..50 {
        let alive = tokio::process::Command::new("sh")
            .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        if !alive {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Start `script`, read the pid it prints first, then drop the receiver
async fn pid_after_dropping_receiver(script: &str) -> String {
    let handle = sh_backend(script).into_handle();
    let mut events = handle
        .prompt(&AgentRequest::new("x"), PromptMode::Query)
        .await
        .unwrap();

    let pid = match events.recv().await {
        Some(AgentEvent::Text(text)) => text.trim().to_string(),
        other => panic!("expected pid line, got {:?}", other),
    };
    drop(events);
    pid
}

#[tokio::test]
async fn test_direct_cli_kills_flooding_child_when_receiver_dropped() {
    init_tracing();
    let pid = pid_after_dropping_receiver("echo $$; exec yes").await;
    assert!(wait_for_exit(&pid).await, "process {} still running", pid);
}

#[tokio::test]
async fn test_direct_cli_kills_quiet_child_when_receiver_dropped() {
    init_tracing();
    let pid = pid_after_dropping_receiver("echo $$; exec sleep 30").await;
    assert!(wait_for_exit(&pid).await, "process {} still running", pid);
}

#[tokio::test]
async fn test_direct_cli_timeout_kills_child() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let handle = sh_backend_in("echo $$ > pid; exec sleep 30", dir.path()).into_handle();

    let response = handle
        .prompt(&AgentRequest::new("x").with_timeout_ms(300), PromptMode::Query)
        .await
        .unwrap()
        .into_response("sh")
        .await;
    assert!(!response.success);

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(wait_for_exit(pid.trim()).await, "process {} still running", pid);
}
