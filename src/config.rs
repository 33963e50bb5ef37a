// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: [dispatch] tunes the engine, [agents] describes where prompts are routed
use crate::paths;
use anyhow::{Context, Result};
use fanout_agent::AgentsConfig;
use fanout_core::{DispatchConfig, RetryPolicyConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked for in the working directory
pub const LOCAL_CONFIG_FILE: &str = "fanout.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Engine tuning; unset fields take the dispatch layer's defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl DispatchSettings {
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            concurrency: self.concurrency,
            timeout: self.timeout_ms.map(Duration::from_millis),
            retry_policy: Some(RetryPolicyConfig {
                max_retries: self.max_retries,
                retry_delay_ms: self.retry_delay_ms,
            }),
            ..DispatchConfig::default()
        }
    }
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. an explicit path (must exist)
    /// 2. FANOUT_CONFIG_PATH env var
    /// 3. ./fanout.toml
    /// 4. the per-user config file
    fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(env_path) = std::env::var("FANOUT_CONFIG_PATH") {
            let path = paths::expand_tilde(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            tracing::warn!(path = %path.display(), "FANOUT_CONFIG_PATH does not exist, ignoring");
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        let user_config = paths::config_file();
        if user_config.exists() {
            return Ok(Some(user_config));
        }

        Ok(None)
    }

    /// Parse a config from TOML without env overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load configuration with environment variable overrides, then validate
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file(explicit)? {
            tracing::info!(path = %config_path.display(), "Loading configuration from file");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply FANOUT_* environment variables on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("FANOUT_CONCURRENCY") {
            self.dispatch.concurrency = Some(val.parse().with_context(|| {
                format!("FANOUT_CONCURRENCY must be a valid number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("FANOUT_TIMEOUT_MS") {
            self.dispatch.timeout_ms = Some(val.parse().with_context(|| {
                format!("FANOUT_TIMEOUT_MS must be a valid number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("FANOUT_MAX_RETRIES") {
            self.dispatch.max_retries = Some(val.parse().with_context(|| {
                format!("FANOUT_MAX_RETRIES must be a valid number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("FANOUT_RETRY_DELAY_MS") {
            self.dispatch.retry_delay_ms = Some(val.parse().with_context(|| {
                format!("FANOUT_RETRY_DELAY_MS must be a valid number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("FANOUT_DEFAULT_AGENT") {
            self.agents.default = val;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.agents.validate().context("Invalid [agents] configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.agents.default, "default");
        assert_eq!(config.agents.agents.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_unset_settings_defer_to_dispatch_defaults() {
        let dispatch = DispatchSettings::default().to_dispatch_config();
        assert_eq!(dispatch.effective_concurrency(), 3);
        assert_eq!(dispatch.effective_timeout(), Duration::from_millis(30_000));
        assert_eq!(dispatch.effective_retry_policy().max_retries, 0);
    }

    #[test]
    fn test_settings_flow_into_dispatch_config() {
        let settings = DispatchSettings {
            concurrency: Some(7),
            timeout_ms: Some(1500),
            max_retries: Some(2),
            retry_delay_ms: Some(25),
        };
        let dispatch = settings.to_dispatch_config();
        assert_eq!(dispatch.effective_concurrency(), 7);
        assert_eq!(dispatch.effective_timeout(), Duration::from_millis(1500));
        assert_eq!(dispatch.effective_retry_policy().max_retries, 2);
        assert_eq!(
            dispatch.effective_retry_policy().retry_delay,
            Duration::from_millis(25)
        );
    }
}
