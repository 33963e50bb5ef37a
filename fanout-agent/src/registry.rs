// ABOUTME: Registry pattern for runtime backend selection.
// ABOUTME: Backends register factories; agents are created by backend type from config.

use crate::config::AgentConfig;
use crate::handle::AgentHandle;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Factory function that creates an AgentHandle from config
pub type BackendFactory = Box<dyn Fn(&Value) -> Result<AgentHandle> + Send + Sync>;

/// Registry for runtime backend selection
pub struct AgentRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory by name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<AgentHandle> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a backend by name with the given config
    pub fn create(&self, name: &str, config: &Value) -> Result<AgentHandle> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown backend: {}", name))?;
        factory(config)
    }

    /// List available backend names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create the backend for one configured agent
    pub fn create_from_config(&self, config: &AgentConfig) -> Result<AgentHandle> {
        self.create(config.backend_type(), &config.to_json_value())
            .with_context(|| format!("Failed to create agent '{}'", config.name))
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        use crate::backends::direct_cli::DirectCliBackend;
        use crate::backends::mock::MockBackend;

        Self::new()
            .register("mock", MockBackend::factory())
            .register("direct", DirectCliBackend::factory())
    }
}
