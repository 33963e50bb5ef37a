// ABOUTME: AgentHandle provides a Send+Sync wrapper around a backend worker task.
// ABOUTME: Uses channels to submit prompts and stream AgentEvents back to the caller.

use crate::event::AgentEvent;
use crate::request::{AgentRequest, AgentResponse, PromptMode};
use anyhow::Result;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Commands sent from AgentHandle to the backend worker
#[derive(Debug)]
pub enum Command {
    Prompt {
        request: AgentRequest,
        mode: PromptMode,
        event_tx: mpsc::Sender<AgentEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Send + Sync handle the runtime talks to.
///
/// The backend itself lives on a worker task; every call is a message on
/// its command channel.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<Command>,
    name: &'static str,
}

impl AgentHandle {
    /// Create a new AgentHandle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, name: &'static str) -> Self {
        Self { tx, name }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Send a prompt and receive events via EventReceiver
    pub async fn prompt(&self, request: &AgentRequest, mode: PromptMode) -> Result<EventReceiver> {
        let (event_tx, event_rx) = mpsc::channel(2048);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Command::Prompt {
                request: request.clone(),
                mode,
                event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;

        // Wait for the backend to acknowledge the prompt started
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))??;

        Ok(EventReceiver::new(event_rx))
    }

    /// Cancel whatever the backend is currently running
    pub async fn cancel(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))?
    }
}

/// Receiver for streaming events from a prompt.
///
/// This is `Send` so it can be passed across async task boundaries.
pub struct EventReceiver {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventReceiver {
    /// Create a new EventReceiver wrapping the given channel
    pub fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or None if the stream is closed
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain the stream into a single response.
    ///
    /// Streamed text wins over the `Result` text when both are present. A
    /// stream that closes without a terminal event is an unsuccessful
    /// response, not an error.
    pub async fn into_response(mut self, agent: &str) -> AgentResponse {
        let started = Instant::now();
        let mut streamed = String::new();
        let mut tools_used = 0usize;

        while let Some(event) = self.recv().await {
            match event {
                AgentEvent::Text(chunk) => streamed.push_str(&chunk),
                AgentEvent::ToolStart { name, .. } => {
                    tools_used += 1;
                    tracing::debug!(agent = %agent, tool = %name, "Tool started");
                }
                AgentEvent::ToolEnd { name, success, .. } => {
                    tracing::debug!(agent = %agent, tool = %name, success, "Tool completed");
                }
                AgentEvent::Custom { kind, .. } => {
                    tracing::debug!(agent = %agent, kind = %kind, "Received custom event");
                }
                AgentEvent::Result {
                    text,
                    usage,
                    metadata,
                } => {
                    let content = if streamed.is_empty() { text } else { streamed };
                    let mut response = AgentResponse::ok(agent, content)
                        .with_duration_ms(started.elapsed().as_millis() as u64);
                    response.usage = usage;
                    response.metadata = metadata;
                    tracing::debug!(
                        agent = %agent,
                        response_len = response.content.len(),
                        tools_count = tools_used,
                        "Agent prompt completed"
                    );
                    return response;
                }
                AgentEvent::Error {
                    code,
                    message,
                    recoverable,
                } => {
                    tracing::debug!(agent = %agent, code = %code, recoverable, "Agent reported error");
                    let mut response = AgentResponse::failed(agent, message)
                        .with_duration_ms(started.elapsed().as_millis() as u64);
                    response.content = streamed;
                    response.metadata = serde_json::json!({
                        "code": code,
                        "recoverable": recoverable,
                    });
                    return response;
                }
            }
        }

        let mut response = AgentResponse::failed(agent, "Agent finished without a response")
            .with_duration_ms(started.elapsed().as_millis() as u64);
        response.content = streamed;
        response
    }
}
