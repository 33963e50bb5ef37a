// ABOUTME: Agent configuration loaded from TOML [agents] sections.
// ABOUTME: Each agent names a backend type; remaining fields are handed to the backend factory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The set of agents a runtime can route to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Agent used when a request names none
    #[serde(default = "default_agent_name")]
    pub default: String,
    /// Configured agents, written as `[[agents.agent]]` tables
    #[serde(default, rename = "agent")]
    pub agents: Vec<AgentConfig>,
}

/// One named agent and its backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,

    /// Backend type: "direct", "mock"
    #[serde(rename = "type")]
    pub backend_type: String,

    /// Remaining fields passed to backend factory
    #[serde(flatten)]
    pub config: toml::Table,
}

fn default_agent_name() -> String {
    "default".to_string()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default: default_agent_name(),
            agents: vec![AgentConfig::mock(&default_agent_name())],
        }
    }
}

impl AgentsConfig {
    /// Parse agent configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse agents TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check agent names are unique and the default agent exists
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            anyhow::bail!("At least one agent must be configured");
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                anyhow::bail!("Agent names must not be empty");
            }
            if !seen.insert(agent.name.as_str()) {
                anyhow::bail!("Duplicate agent name: {}", agent.name);
            }
        }

        if !seen.contains(self.default.as_str()) {
            anyhow::bail!(
                "Default agent '{}' is not configured (known agents: {})",
                self.default,
                self.agents
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }
}

impl AgentConfig {
    /// A mock agent with no extra configuration
    pub fn mock(name: &str) -> Self {
        Self {
            name: name.to_string(),
            backend_type: "mock".to_string(),
            config: toml::Table::new(),
        }
    }

    /// Get backend type name
    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    /// Convert config table to serde_json::Value for registry
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_agent() {
        let toml = r#"
default = "claude"

[[agent]]
name = "claude"
type = "direct"
binary = "claude"
query_args = ["--print"]
"#;
        let config = AgentsConfig::parse(toml).unwrap();
        assert_eq!(config.default, "claude");
        let agent = config.get("claude").unwrap();
        assert_eq!(agent.backend_type(), "direct");

        let json = agent.to_json_value();
        assert_eq!(json["binary"], "claude");
        assert_eq!(json["query_args"], serde_json::json!(["--print"]));
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_default_is_single_mock_agent() {
        let config = AgentsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].backend_type(), "mock");
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let toml = r#"
default = "a"

[[agent]]
name = "a"
type = "mock"

[[agent]]
name = "a"
type = "mock"
"#;
        let err = AgentsConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate agent name"));
    }

    #[test]
    fn test_rejects_unknown_default() {
        let toml = r#"
default = "missing"

[[agent]]
name = "a"
type = "mock"
"#;
        let err = AgentsConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
