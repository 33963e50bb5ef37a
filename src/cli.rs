// ABOUTME: Command-line interface - parses arguments and runs a dispatch batch.
// ABOUTME: Results go to stdout as JSON; the exit code reports whether every request succeeded.

use crate::config::{Config, DispatchSettings};
use crate::paths;
use crate::prompts;
use crate::telemetry::{self, LogFormat};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fanout_agent::{AgentRegistry, AgentRuntime, HandleRuntime, PromptMode};
use fanout_core::{dispatch_with_summary, DispatchSummary};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Fan prompts out to AI agents in parallel
#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Fan query and execute prompts out to AI agents in parallel")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to FANOUT_CONFIG_PATH, ./fanout.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address while running
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask every prompt as a query
    Query(RunArgs),
    /// Run every prompt as an execute
    Exec(RunArgs),
    /// List configured agents
    Agents,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// JSON array of requests, or one prompt per line
    #[arg(long)]
    pub prompts: PathBuf,

    /// Agent for prompts that do not name one
    #[arg(long)]
    pub agent: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Extra attempts per prompt
    #[arg(long)]
    pub retries: Option<u32>,

    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
}

impl RunArgs {
    /// Flags win over file and environment values
    pub fn apply_to(&self, settings: &mut DispatchSettings) {
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = Some(concurrency);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.timeout_ms = Some(timeout_ms);
        }
        if let Some(retries) = self.retries {
            settings.max_retries = Some(retries);
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms {
            settings.retry_delay_ms = Some(retry_delay_ms);
        }
    }
}

/// Run the parsed command. Logging must already be initialized.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(addr) = cli.metrics_addr {
        telemetry::install_metrics_exporter(addr)?;
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::info!(
        default_agent = %config.agents.default,
        agents = config.agents.agents.len(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Query(args) => run_batch(&config, PromptMode::Query, &args).await,
        Commands::Exec(args) => run_batch(&config, PromptMode::Execute, &args).await,
        Commands::Agents => {
            let agents: Vec<serde_json::Value> = config
                .agents
                .agents
                .iter()
                .map(|agent| {
                    serde_json::json!({
                        "name": agent.name,
                        "type": agent.backend_type(),
                        "default": agent.name == config.agents.default,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&agents)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load prompts, dispatch them, and print the ordered results
pub async fn run_batch(config: &Config, mode: PromptMode, args: &RunArgs) -> Result<ExitCode> {
    let summary = dispatch_file(config, mode, args).await?;

    println!("{}", serde_json::to_string_pretty(&summary.results)?);
    tracing::info!(
        total = summary.total,
        succeeded = summary.success_count,
        failed = summary.failure_count,
        duration_ms = summary.metrics.total_duration_ms,
        throughput = summary.metrics.throughput,
        "Batch complete"
    );
    for error in &summary.errors {
        tracing::warn!(index = error.index, error = %error.error, "Request failed");
    }

    Ok(if summary.failure_count == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Dispatch the prompt file named by `args` against the configured agents
pub async fn dispatch_file(
    config: &Config,
    mode: PromptMode,
    args: &RunArgs,
) -> Result<DispatchSummary> {
    let prompts_path = paths::expand_tilde(&args.prompts.to_string_lossy());
    let mut requests = prompts::load_requests(&prompts_path)?;
    if let Some(agent) = &args.agent {
        prompts::assign_agent(&mut requests, agent);
    }

    let mut settings = config.dispatch.clone();
    args.apply_to(&mut settings);

    let registry = AgentRegistry::default();
    let runtime: Arc<dyn AgentRuntime> = Arc::new(
        HandleRuntime::from_config(&registry, &config.agents)
            .context("Failed to start agents")?,
    );

    let dispatch_config = settings
        .to_dispatch_config()
        .on_progress(|completed, total| {
            tracing::info!(completed, total, "Progress");
            Ok(())
        });

    dispatch_with_summary(runtime, requests, mode, dispatch_config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_query_with_flags() {
        let cli = Cli::try_parse_from([
            "fanout",
            "--log-format",
            "json",
            "query",
            "--prompts",
            "p.txt",
            "--agent",
            "codex",
            "--concurrency",
            "4",
            "--retries",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Query(args) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.prompts, PathBuf::from("p.txt"));
        assert_eq!(args.agent.as_deref(), Some("codex"));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.retries, Some(2));
        assert_eq!(args.timeout_ms, None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fanout",
            "exec",
            "--prompts",
            "p.json",
            "--config",
            "alt.toml",
            "--metrics-addr",
            "127.0.0.1:9000",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Exec(_)));
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert_eq!(cli.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_prompts_flag_is_required() {
        assert!(Cli::try_parse_from(["fanout", "query"]).is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = DispatchSettings {
            concurrency: Some(2),
            timeout_ms: Some(1000),
            max_retries: Some(1),
            retry_delay_ms: None,
        };
        let args = RunArgs {
            concurrency: Some(8),
            retry_delay_ms: Some(5),
            ..RunArgs::default()
        };
        args.apply_to(&mut settings);

        assert_eq!(
            settings,
            DispatchSettings {
                concurrency: Some(8),
                timeout_ms: Some(1000),
                max_retries: Some(1),
                retry_delay_ms: Some(5),
            }
        );
    }
}
