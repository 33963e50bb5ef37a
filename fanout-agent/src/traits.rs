// ABOUTME: Core AgentRuntime trait consumed by the parallel dispatch engine.
// ABOUTME: Defines the query and execute operations over an AgentRequest.

use crate::request::{AgentRequest, AgentResponse, PromptMode};
use anyhow::Result;
use futures::future::BoxFuture;

/// The domain operation the dispatch engine fans out.
///
/// An `Err` means the operation itself failed (process did not start, agent
/// unknown, channel closed). A provider-level failure comes back as
/// `Ok(AgentResponse { success: false, .. })`.
pub trait AgentRuntime: Send + Sync {
    /// Runtime name for logging
    fn name(&self) -> &str;

    /// Ask an agent a question
    fn query<'a>(&'a self, request: &'a AgentRequest) -> BoxFuture<'a, Result<AgentResponse>>;

    /// Ask an agent to carry out work
    fn execute<'a>(&'a self, request: &'a AgentRequest) -> BoxFuture<'a, Result<AgentResponse>>;

    /// Dispatch on mode
    fn run<'a>(
        &'a self,
        mode: PromptMode,
        request: &'a AgentRequest,
    ) -> BoxFuture<'a, Result<AgentResponse>> {
        match mode {
            PromptMode::Query => self.query(request),
            PromptMode::Execute => self.execute(request),
        }
    }
}
