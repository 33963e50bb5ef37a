// ABOUTME: Loads batches of AgentRequests from a prompt file.
// ABOUTME: Accepts a JSON array of request objects or plain text with one prompt per line.

use anyhow::{Context, Result};
use fanout_agent::AgentRequest;
use std::path::Path;

/// Parse a prompt file's contents.
///
/// Content whose first non-whitespace character is `[` is read as JSON;
/// anything else is one prompt per non-empty line.
pub fn parse_requests(content: &str) -> Result<Vec<AgentRequest>> {
    let requests: Vec<AgentRequest> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content).context("Failed to parse JSON prompt array")?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(AgentRequest::new)
            .collect()
    };

    if let Some(index) = requests.iter().position(|r| r.prompt.trim().is_empty()) {
        anyhow::bail!("Request {} has an empty prompt", index);
    }
    Ok(requests)
}

pub fn load_requests(path: &Path) -> Result<Vec<AgentRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
    let requests = parse_requests(&content)
        .with_context(|| format!("Invalid prompt file {}", path.display()))?;
    tracing::debug!(path = %path.display(), requests = requests.len(), "Loaded prompts");
    Ok(requests)
}

/// Route requests that name no agent to `agent`
pub fn assign_agent(requests: &mut [AgentRequest], agent: &str) {
    for request in requests.iter_mut().filter(|r| r.agent.is_none()) {
        request.agent = Some(agent.to_string());
    }
}
