// ABOUTME: Event types streamed by agent backends while a prompt is running.
// ABOUTME: Folded into an AgentResponse once the backend reports a result or an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by agent backends during prompt execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// Streaming text chunk
    Text(String),

    /// Tool started execution
    ToolStart {
        /// Unique identifier for this tool invocation
        id: String,
        /// Tool name (e.g., "Read", "Bash")
        name: String,
        /// Full input passed to the tool
        input: Value,
    },

    /// Tool completed execution
    ToolEnd {
        /// Matches the id from ToolStart
        id: String,
        /// Tool name
        name: String,
        /// Whether the tool succeeded
        success: bool,
        /// Execution time in milliseconds
        duration_ms: u64,
    },

    /// Final result with optional usage statistics
    Result {
        /// The final text response
        text: String,
        /// Token usage and cost (if available)
        usage: Option<Usage>,
        /// Backend-specific metadata
        metadata: Value,
    },

    /// Error occurred during execution
    Error {
        /// Typed error code for programmatic handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Whether the error is recoverable (can retry)
        recoverable: bool,
    },

    /// Backend-specific event for extensibility
    Custom {
        /// Event kind (e.g., "cli.stderr")
        kind: String,
        /// Event payload
        payload: Value,
    },
}

impl AgentEvent {
    /// Whether this event ends the prompt
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Result { .. } | AgentEvent::Error { .. })
    }
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Rate limited by the provider
    RateLimited,
    /// Authentication failed
    AuthFailed,
    /// Prompt was cancelled
    Cancelled,
    /// Tool execution failed
    ToolFailed,
    /// Backend-specific error
    BackendError,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Timeout => "timeout",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::AuthFailed => "auth_failed",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::ToolFailed => "tool_failed",
            ErrorCode::BackendError => "backend_error",
            ErrorCode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Token usage and cost tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    /// Input tokens consumed
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
    /// Total cost in USD
    pub cost_usd: Option<f64>,
}
