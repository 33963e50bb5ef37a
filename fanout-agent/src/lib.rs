// ABOUTME: Pluggable AI-provider backends for fanout.
// ABOUTME: Exposes the query/execute AgentRuntime consumed by the parallel dispatch engine.

pub mod config;
pub mod event;
pub mod handle;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod traits;

pub mod backends;

pub use config::{AgentConfig, AgentsConfig};
pub use event::{AgentEvent, ErrorCode, Usage};
pub use handle::{AgentHandle, EventReceiver};
pub use registry::{AgentRegistry, BackendFactory};
pub use request::{AgentRequest, AgentResponse, PromptMode};
pub use runtime::HandleRuntime;
pub use traits::AgentRuntime;
