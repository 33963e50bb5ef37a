// ABOUTME: Root library module for the fanout command-line tool
// ABOUTME: Provides config loading, prompt files, telemetry setup, and the CLI driver

pub mod cli;
pub mod config;
pub mod paths;
pub mod prompts;
pub mod telemetry;

// Re-export the engine and agent crates
pub use fanout_agent as agent;
pub use fanout_core as engine;
