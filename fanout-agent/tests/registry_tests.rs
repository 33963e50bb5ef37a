use fanout_agent::backends::mock::MockBackend;
use fanout_agent::{AgentConfig, AgentRegistry, AgentRequest, PromptMode};
use serde_json::json;

#[test]
fn test_default_registry_has_builtin_backends() {
    let registry = AgentRegistry::default();
    assert_eq!(registry.available(), vec!["direct", "mock"]);
}

#[test]
fn test_unknown_backend_is_error() {
    let registry = AgentRegistry::new();
    let err = registry.create("nope", &json!({})).err().unwrap();
    assert!(err.to_string().contains("Unknown backend: nope"));
}

#[tokio::test]
async fn test_custom_factory_is_used() {
    let registry = AgentRegistry::new().register("canned", |_config| {
        Ok(MockBackend::new()
            .on_prompt("ping")
            .respond_text("pong")
            .into_handle())
    });

    let handle = registry.create("canned", &json!({})).unwrap();
    let response = handle
        .prompt(&AgentRequest::new("ping"), PromptMode::Query)
        .await
        .unwrap()
        .into_response("canned")
        .await;
    assert_eq!(response.content, "pong");
}

#[tokio::test]
async fn test_direct_backend_requires_binary() {
    let registry = AgentRegistry::default();
    let mut config = AgentConfig::mock("cli");
    config.backend_type = "direct".to_string();

    let err = registry.create_from_config(&config).err().unwrap();
    assert!(format!("{:#}", err).contains("Failed to create agent 'cli'"));
}
