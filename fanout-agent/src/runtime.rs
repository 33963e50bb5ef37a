// ABOUTME: HandleRuntime routes query/execute requests to named AgentHandles.
// ABOUTME: Built from AgentsConfig through the registry, or assembled by hand in tests.

use crate::config::AgentsConfig;
use crate::handle::AgentHandle;
use crate::registry::AgentRegistry;
use crate::request::{AgentRequest, AgentResponse, PromptMode};
use crate::traits::AgentRuntime;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::Instant;

/// AgentRuntime over a fixed set of named agents
#[derive(Clone)]
pub struct HandleRuntime {
    agents: HashMap<String, AgentHandle>,
    default_agent: String,
}

impl HandleRuntime {
    /// Create an empty runtime whose default agent is `default_agent`
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            agents: HashMap::new(),
            default_agent: default_agent.into(),
        }
    }

    /// Add (or replace) an agent
    pub fn with_agent(mut self, name: impl Into<String>, handle: AgentHandle) -> Self {
        self.agents.insert(name.into(), handle);
        self
    }

    /// Instantiate every configured agent through the registry
    pub fn from_config(registry: &AgentRegistry, config: &AgentsConfig) -> Result<Self> {
        config.validate()?;
        let mut runtime = Self::new(config.default.clone());
        for agent in &config.agents {
            let handle = registry.create_from_config(agent)?;
            tracing::debug!(agent = %agent.name, backend = %handle.name(), "Agent created");
            runtime.agents.insert(agent.name.clone(), handle);
        }
        Ok(runtime)
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    /// Names of all registered agents, sorted
    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, request: &AgentRequest) -> Result<(&str, &AgentHandle)> {
        let name = request.agent_or(&self.default_agent);
        self.agents
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| anyhow!("Unknown agent: {}", name))
    }

    async fn send(&self, request: &AgentRequest, mode: PromptMode) -> Result<AgentResponse> {
        let started = Instant::now();
        let (agent, handle) = self.resolve(request)?;
        tracing::debug!(agent = %agent, mode = %mode, "Sending prompt to agent");

        let receiver = handle.prompt(request, mode).await?;
        let response = receiver.into_response(agent).await;
        Ok(response.with_duration_ms(started.elapsed().as_millis() as u64))
    }
}

impl AgentRuntime for HandleRuntime {
    fn name(&self) -> &str {
        "handles"
    }

    fn query<'a>(&'a self, request: &'a AgentRequest) -> BoxFuture<'a, Result<AgentResponse>> {
        Box::pin(self.send(request, PromptMode::Query))
    }

    fn execute<'a>(&'a self, request: &'a AgentRequest) -> BoxFuture<'a, Result<AgentResponse>> {
        Box::pin(self.send(request, PromptMode::Execute))
    }
}
