// ABOUTME: Direct CLI backend - spawns a provider CLI once per prompt.
// ABOUTME: Streams stdout lines as Text events and maps a non-zero exit to an Error event.

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::{AgentHandle, Command};
use crate::request::{AgentRequest, PromptMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Configuration for the Direct CLI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectCliConfig {
    /// Path to the provider binary
    pub binary: String,
    /// Working directory for the spawned process
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Arguments placed before the prompt for query operations
    #[serde(default)]
    pub query_args: Vec<String>,
    /// Arguments placed before the prompt for execute operations
    #[serde(default)]
    pub execute_args: Vec<String>,
    /// Flag used to pass `AgentRequest::model` (e.g. "--model")
    #[serde(default)]
    pub model_flag: Option<String>,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

pub struct DirectCliBackend {
    config: DirectCliConfig,
}

impl DirectCliBackend {
    pub fn new(config: DirectCliConfig) -> Result<Self> {
        if config.binary.trim().is_empty() {
            anyhow::bail!("direct backend requires a non-empty binary");
        }
        Ok(Self { config })
    }

    pub fn into_handle(self) -> AgentHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let config = self.config;

        tokio::spawn(async move {
            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Prompt {
                        request,
                        mode,
                        event_tx,
                        reply,
                    } => {
                        let _ = reply.send(Ok(()));
                        let config = config.clone();
                        in_flight.retain(|h| !h.is_finished());
                        in_flight.push(tokio::spawn(async move {
                            if let Err(e) = run_prompt(&config, &request, mode, &event_tx).await {
                                tracing::error!(error = %e, "Direct CLI prompt failed");
                                let _ = event_tx
                                    .send(AgentEvent::Error {
                                        code: ErrorCode::BackendError,
                                        message: format!("{:#}", e),
                                        recoverable: false,
                                    })
                                    .await;
                            }
                        }));
                    }
                    Command::Cancel { reply } => {
                        // Dropping the task drops the child, which kill_on_drop terminates
                        for handle in in_flight.drain(..) {
                            handle.abort();
                        }
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });

        AgentHandle::new(tx, "direct")
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|config| {
            let cfg: DirectCliConfig = serde_json::from_value(config.clone())
                .context("Invalid direct backend configuration")?;
            let backend = DirectCliBackend::new(cfg)?;
            Ok(backend.into_handle())
        })
    }
}

/// Build the argument list for one prompt
pub fn build_args(config: &DirectCliConfig, request: &AgentRequest, mode: PromptMode) -> Vec<String> {
    let mut args = match mode {
        PromptMode::Query => config.query_args.clone(),
        PromptMode::Execute => config.execute_args.clone(),
    };

    if let (Some(flag), Some(model)) = (&config.model_flag, &request.model) {
        args.push(flag.clone());
        args.push(model.clone());
    }

    let prompt = match &request.system_prompt {
        Some(system) => format!("{}\n\n{}", system, request.prompt),
        None => request.prompt.clone(),
    };
    args.push(prompt);
    args
}

async fn run_prompt(
    config: &DirectCliConfig,
    request: &AgentRequest,
    mode: PromptMode,
    event_tx: &mpsc::Sender<AgentEvent>,
) -> Result<()> {
    let args = build_args(config, request, mode);
    tracing::debug!(binary = %config.binary, mode = %mode, arg_count = args.len(), "Spawning provider CLI");

    let started = Instant::now();
    let mut child = ProcessCommand::new(&config.binary)
        .args(&args)
        .current_dir(&config.working_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", config.binary))?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let stderr_tx = event_tx.clone();
    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last_line = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            tracing::debug!(stderr = %line, "Provider CLI stderr");
            let _ = stderr_tx
                .send(AgentEvent::Custom {
                    kind: "cli.stderr".to_string(),
                    payload: serde_json::Value::String(line.clone()),
                })
                .await;
            last_line = line;
        }
        last_line
    });

    // Resolves to None when the receiver went away before the child exited
    let stream = async {
        let mut lines = BufReader::new(stdout).lines();
        let mut first = true;
        let mut receiver_gone = false;
        loop {
            let line = tokio::select! {
                _ = event_tx.closed() => {
                    receiver_gone = true;
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let chunk = if first { line } else { format!("\n{}", line) };
            first = false;
            if event_tx.send(AgentEvent::Text(chunk)).await.is_err() {
                receiver_gone = true;
                break;
            }
        }
        // The child must see a closed pipe rather than block on a full one
        drop(lines);

        let waited = if receiver_gone {
            None
        } else {
            tokio::select! {
                status = child.wait() => Some(status),
                _ = event_tx.closed() => None,
            }
        };
        match waited {
            Some(status) => Ok::<_, anyhow::Error>(Some(
                status.context("Failed to wait for provider CLI")?,
            )),
            None => {
                tracing::debug!("Event receiver closed, killing provider CLI");
                kill_child(&mut child).await;
                Ok(None)
            }
        }
    };

    let outcome = match request.timeout_ms {
        Some(ms) => {
            let timed = tokio::time::timeout(Duration::from_millis(ms), stream).await;
            match timed {
                Ok(outcome) => outcome?,
                Err(_) => {
                    kill_child(&mut child).await;
                    let _ = event_tx
                        .send(AgentEvent::Error {
                            code: ErrorCode::Timeout,
                            message: format!("Provider CLI timed out after {}ms", ms),
                            recoverable: true,
                        })
                        .await;
                    stderr_handle.abort();
                    return Ok(());
                }
            }
        }
        None => stream.await?,
    };
    let Some(status) = outcome else {
        stderr_handle.abort();
        return Ok(());
    };

    let last_stderr = match stderr_handle.await {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "stderr reader task failed to complete");
            String::new()
        }
    };

    let event = if status.success() {
        AgentEvent::Result {
            text: String::new(),
            usage: None,
            metadata: serde_json::json!({
                "exit_code": status.code(),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            }),
        }
    } else {
        let mut message = format!("CLI exited with status: {:?}", status.code());
        if !last_stderr.is_empty() {
            message = format!("{} ({})", message, last_stderr);
        }
        AgentEvent::Error {
            code: ErrorCode::BackendError,
            message,
            recoverable: false,
        }
    };
    let _ = event_tx.send(event).await;

    Ok(())
}

/// Kill the child and reap it so no process outlives its prompt
async fn kill_child(child: &mut tokio::process::Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Provider CLI already exited");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "Failed to reap provider CLI");
    }
}
