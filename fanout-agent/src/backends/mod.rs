// ABOUTME: Backend implementations (direct CLI, mock).
// ABOUTME: Each backend runs on a worker task behind an AgentHandle.

pub mod direct_cli;
pub mod mock;
