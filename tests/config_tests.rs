// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, search order, env var overrides, and agent validation

use fanout::config::{Config, DispatchSettings};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("FANOUT_CONFIG_PATH");
    std::env::remove_var("FANOUT_CONCURRENCY");
    std::env::remove_var("FANOUT_TIMEOUT_MS");
    std::env::remove_var("FANOUT_MAX_RETRIES");
    std::env::remove_var("FANOUT_RETRY_DELAY_MS");
    std::env::remove_var("FANOUT_DEFAULT_AGENT");
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("fanout.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

const FULL_CONFIG: &str = r#"
[dispatch]
concurrency = 6
timeout_ms = 45000
max_retries = 2

[agents]
default = "claude"

[[agents.agent]]
name = "claude"
type = "direct"
binary = "claude"
query_args = ["--print"]

[[agents.agent]]
name = "scratch"
type = "mock"
"#;

#[test]
#[serial]
fn test_config_loads_from_explicit_path() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(
        config.dispatch,
        DispatchSettings {
            concurrency: Some(6),
            timeout_ms: Some(45000),
            max_retries: Some(2),
            retry_delay_ms: None,
        }
    );
    assert_eq!(config.agents.default, "claude");
    assert_eq!(config.agents.agents.len(), 2);

    let claude = config.agents.get("claude").unwrap();
    assert_eq!(claude.backend_type(), "direct");
    assert_eq!(claude.to_json_value()["binary"], "claude");
    assert_eq!(config.agents.get("scratch").unwrap().backend_type(), "mock");
}

#[test]
#[serial]
fn test_config_path_env_var_is_used() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[dispatch]\nconcurrency = 9\n");
    std::env::set_var("FANOUT_CONFIG_PATH", path.to_str().unwrap());

    let config = Config::load(None).unwrap();
    assert_eq!(config.dispatch.concurrency, Some(9));
    assert_eq!(config.agents.default, "default");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_explicit_path_must_exist() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
#[serial]
fn test_env_vars_override_file_values() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    std::env::set_var("FANOUT_CONCURRENCY", "12");
    std::env::set_var("FANOUT_TIMEOUT_MS", "1000");
    std::env::set_var("FANOUT_MAX_RETRIES", "0");
    std::env::set_var("FANOUT_RETRY_DELAY_MS", "50");
    std::env::set_var("FANOUT_DEFAULT_AGENT", "scratch");

    let config = Config::load(Some(&path)).unwrap();
    clear_config_env_vars();

    assert_eq!(config.dispatch.concurrency, Some(12));
    assert_eq!(config.dispatch.timeout_ms, Some(1000));
    assert_eq!(config.dispatch.max_retries, Some(0));
    assert_eq!(config.dispatch.retry_delay_ms, Some(50));
    assert_eq!(config.agents.default, "scratch");
}

#[test]
#[serial]
fn test_invalid_env_number_is_an_error() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);
    std::env::set_var("FANOUT_CONCURRENCY", "lots");

    let err = Config::load(Some(&path)).unwrap_err();
    clear_config_env_vars();

    assert!(err
        .to_string()
        .contains("FANOUT_CONCURRENCY must be a valid number, got: lots"));
}

#[test]
#[serial]
fn test_unknown_default_agent_fails_validation() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);
    std::env::set_var("FANOUT_DEFAULT_AGENT", "ghost");

    let err = Config::load(Some(&path)).unwrap_err();
    clear_config_env_vars();

    let message = format!("{:#}", err);
    assert!(message.contains("Invalid [agents] configuration"));
    assert!(message.contains("Default agent 'ghost' is not configured"));
}

#[test]
#[serial]
fn test_duplicate_agent_names_are_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[[agents.agent]]
name = "default"
type = "mock"

[[agents.agent]]
name = "default"
type = "mock"
"#,
    );

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Duplicate agent name: default"));
}

#[test]
#[serial]
fn test_malformed_toml_names_the_file() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[dispatch\nconcurrency = ");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
    assert!(err.to_string().contains("fanout.toml"));
}
