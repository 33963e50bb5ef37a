// ABOUTME: Request and response payloads for query/execute operations.
// ABOUTME: Requests name an optional agent; responses carry a success flag plus content or error.

use crate::event::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which kind of operation a prompt is sent as
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Ask the agent a question; no side effects expected
    Query,
    /// Ask the agent to carry out work (tools, edits)
    Execute,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Query => "query",
            PromptMode::Execute => "execute",
        }
    }
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prompt destined for one agent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    /// Agent to route to; the runtime's default agent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Backend-level timeout hint, independent of the scheduler's deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Agent id used for routing and task naming
    pub fn agent_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.agent.as_deref().unwrap_or(fallback)
    }
}

/// Outcome of a query or execute operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Agent that produced the response
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AgentResponse {
    /// Successful response with the given content
    pub fn ok(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            agent: agent.into(),
            ..Default::default()
        }
    }

    /// Unsuccessful response carrying an error message
    pub fn failed(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            agent: agent.into(),
            ..Default::default()
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
