// ABOUTME: Mock backend for testing - returns pre-configured responses.
// ABOUTME: Allows deterministic tests without spawning real provider processes.
//!
//! # Example
//!
//! ```no_run
//! use fanout_agent::backends::mock::MockBackend;
//! use fanout_agent::{AgentRequest, PromptMode};
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_text("Hi there!")
//!     .on_prompt("broken").respond_error(fanout_agent::ErrorCode::BackendError, "nope");
//!
//! let handle = mock.into_handle();
//! let receiver = handle
//!     .prompt(&AgentRequest::new("hello"), PromptMode::Query)
//!     .await
//!     .unwrap();
//! let response = receiver.into_response("mock").await;
//! assert_eq!(response.content, "Hi there!");
//! # }
//! ```

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::{AgentHandle, Command};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Mock backend for testing
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    prompt_count: Arc<AtomicUsize>,
}

struct Expectation {
    pattern: String,
    events: Vec<AgentEvent>,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            prompt_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set up an expectation for a prompt matching the given pattern
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
            delay: None,
        }
    }

    /// Shared counter of prompts received, readable after `into_handle`
    pub fn prompt_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.prompt_count)
    }

    /// Convert this backend into an AgentHandle
    pub fn into_handle(self) -> AgentHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let expectations = self.expectations;
        let prompt_count = self.prompt_count;

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
                        prompt_count.fetch_add(1, Ordering::SeqCst);
                        let _ = reply.send(Ok(()));

                        let text = request.prompt;
                        // FIFO preference: take the front if it matches, otherwise
                        // the first matching expectation anywhere in the queue.
                        let matched = {
                            let mut exp = expectations.lock().unwrap_or_else(|e| e.into_inner());
                            match exp.front() {
                                Some(front) if text.contains(&front.pattern) => exp.pop_front(),
                                Some(_) => exp
                                    .iter()
                                    .position(|e| text.contains(&e.pattern))
                                    .and_then(|i| exp.remove(i)),
                                None => None,
                            }
                        };

                        let (events, delay) = match matched {
                            Some(e) => (e.events, e.delay),
                            None => (
                                vec![AgentEvent::Result {
                                    text: format!("Mock: no expectation for '{}'", text),
                                    usage: None,
                                    metadata: serde_json::json!({ "mode": mode }),
                                }],
                                None,
                            ),
                        };

                        in_flight.retain(|h| !h.is_finished());
                        in_flight.push(tokio::spawn(async move {
                            if let Some(delay) = delay {
                                tokio::time::sleep(delay).await;
                            }
                            for event in events {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }));
                    }
                    Command::Cancel { reply } => {
                        for handle in in_flight.drain(..) {
                            handle.abort();
                        }
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });

        AgentHandle::new(tx, "mock")
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|_config| Ok(MockBackend::new().into_handle()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
    delay: Option<Duration>,
}

impl ExpectationBuilder {
    /// Wait this long before emitting any events
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Respond with a list of events
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                events,
                delay: self.delay,
            });
        self.backend
    }

    /// Respond with a simple text result
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Result {
            text: text.to_string(),
            usage: None,
            metadata: serde_json::json!({}),
        }])
    }

    /// Respond with an error
    pub fn respond_error(self, code: ErrorCode, message: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Error {
            code,
            message: message.to_string(),
            recoverable: false,
        }])
    }

    /// Never respond; the event stream stays open until cancelled
    pub fn hang(self) -> MockBackend {
        self.with_delay(Duration::from_secs(365 * 24 * 60 * 60))
            .respond_with(vec![])
    }
}
