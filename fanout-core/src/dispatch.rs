// ABOUTME: Dispatch helpers that fan query/execute requests out through the Scheduler.
// ABOUTME: Wraps each request in a retrying Task, then restores input order and builds a summary.

use crate::metrics::{self, RunMetrics};
use crate::retry::{run_with_retry, RetryPolicy, RetryPolicyConfig};
use crate::scheduler::{RunOptions, Scheduler, TaskCallbacks};
use crate::task::{Task, TaskContext, TaskResult};
use async_trait::async_trait;
use fanout_agent::{AgentRequest, AgentResponse, AgentRuntime, PromptMode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Agent name used in task ids when a request names none
const DEFAULT_AGENT_LABEL: &str = "default";

/// Called with (completed, total) after every task settles
pub type ProgressCallback = Arc<dyn Fn(usize, usize) -> anyhow::Result<()> + Send + Sync>;

/// Called once with the final summary
pub type CompleteCallback = Arc<dyn Fn(&DispatchSummary) -> anyhow::Result<()> + Send + Sync>;

/// Options for one dispatch call; every field is optional
#[derive(Clone, Default)]
pub struct DispatchConfig {
    /// None or 0 falls back to DEFAULT_CONCURRENCY
    pub concurrency: Option<usize>,
    /// None or zero falls back to DEFAULT_TIMEOUT; dispatch never runs without a deadline
    pub timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicyConfig>,
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompleteCallback>,
}

impl std::fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<fn>"))
            .field("on_complete", &self.on_complete.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicyConfig) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DispatchSummary) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    /// Effective worker count
    pub fn effective_concurrency(&self) -> usize {
        match self.concurrency {
            Some(n) if n > 0 => n,
            _ => DEFAULT_CONCURRENCY,
        }
    }

    /// Effective per-task deadline
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout {
            Some(t) if !t.is_zero() => t,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Effective retry policy
    pub fn effective_retry_policy(&self) -> RetryPolicy {
        self.retry_policy.unwrap_or_default().resolve()
    }
}

/// One request's outcome, annotated with where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    #[serde(flatten)]
    pub response: AgentResponse,
    pub request_index: usize,
    pub mode: PromptMode,
    /// The task's token was tripped (e.g. it hit the deadline)
    #[serde(default)]
    pub aborted: bool,
}

impl DispatchResult {
    pub fn success(&self) -> bool {
        self.response.success
    }
}

/// An unsuccessful outcome at a given request index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchError {
    pub index: usize,
    pub error: String,
}

/// Aggregate view of a dispatch call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub completed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// In input order
    pub results: Vec<DispatchResult>,
    pub errors: Vec<DispatchError>,
    pub metrics: RunMetrics,
}

impl DispatchSummary {
    fn from_results(total: usize, results: Vec<DispatchResult>, metrics: RunMetrics) -> Self {
        let errors: Vec<DispatchError> = results
            .iter()
            .filter(|r| !r.success())
            .map(|r| DispatchError {
                index: r.request_index,
                error: r
                    .response
                    .error
                    .clone()
                    .unwrap_or_else(|| "unsuccessful response".to_string()),
            })
            .collect();
        let failure_count = errors.len();

        Self {
            total,
            completed: results.len(),
            success_count: results.len() - failure_count,
            failure_count,
            results,
            errors,
            metrics,
        }
    }
}

/// Counts settled tasks and forwards progress
struct ProgressTracker {
    completed: AtomicUsize,
    total: usize,
    on_progress: Option<ProgressCallback>,
}

impl ProgressTracker {
    fn tick(&self, task_id: &str) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(task_id = %task_id, completed, total = self.total, "Dispatch progress");
        if let Some(callback) = &self.on_progress {
            guard_sync("on_progress", || callback(completed, self.total));
        }
    }
}

#[async_trait]
impl TaskCallbacks<AgentResponse> for ProgressTracker {
    async fn on_task_complete(&self, result: &TaskResult<AgentResponse>) -> anyhow::Result<()> {
        self.tick(&result.task_id);
        Ok(())
    }

    async fn on_error(&self, result: &TaskResult<AgentResponse>) -> anyhow::Result<()> {
        self.tick(&result.task_id);
        Ok(())
    }
}

/// Run a user callback, logging errors and panics instead of propagating them
fn guard_sync<F>(hook: &'static str, callback: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(hook, error = %e, "Dispatch callback failed"),
        Err(_) => tracing::error!(hook, "Dispatch callback panicked"),
    }
}

fn build_task(
    runtime: &Arc<dyn AgentRuntime>,
    request: AgentRequest,
    index: usize,
    mode: PromptMode,
    policy: RetryPolicy,
) -> Task<AgentResponse> {
    let agent = request.agent_or(DEFAULT_AGENT_LABEL).to_string();
    let id = format!("{}-{}-{}", mode, agent, index);
    let runtime = Arc::clone(runtime);
    let request = Arc::new(request);

    Task::new(id, move |ctx: TaskContext| {
        let runtime = Arc::clone(&runtime);
        let request = Arc::clone(&request);
        async move {
            run_with_retry(
                &policy,
                &ctx.cancellation,
                &ctx.task_id,
                |_attempt| runtime.run(mode, &request),
                |response: &AgentResponse| response.success,
            )
            .await
        }
    })
    .with_metadata(json!({
        "index": index,
        "mode": mode,
        "agent": agent,
    }))
}

fn into_dispatch_result(
    result: TaskResult<AgentResponse>,
    index: usize,
    mode: PromptMode,
) -> DispatchResult {
    let response = match (result.value, result.error) {
        (Some(response), _) => response,
        (None, error) => {
            let agent = result.metadata["agent"]
                .as_str()
                .unwrap_or(DEFAULT_AGENT_LABEL)
                .to_string();
            let message = error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "task produced no value".to_string());
            AgentResponse::failed(agent, message).with_duration_ms(result.duration_ms)
        }
    };

    DispatchResult {
        response,
        request_index: index,
        mode,
        aborted: result.aborted,
    }
}

/// Shared routine behind run_queries_parallel and run_executes_parallel.
///
/// Always delivers a summary to `on_complete`, including for an empty batch,
/// and returns it.
pub async fn dispatch_with_summary(
    runtime: Arc<dyn AgentRuntime>,
    requests: Vec<AgentRequest>,
    mode: PromptMode,
    config: DispatchConfig,
) -> anyhow::Result<DispatchSummary> {
    let total = requests.len();
    metrics::record_dispatch(mode.as_str(), total);

    if requests.is_empty() {
        tracing::debug!(mode = %mode, "No requests to dispatch");
        let summary = DispatchSummary::from_results(0, Vec::new(), RunMetrics::default());
        if let Some(on_complete) = &config.on_complete {
            guard_sync("on_complete", || on_complete(&summary));
        }
        return Ok(summary);
    }

    let concurrency = config.effective_concurrency();
    let timeout = config.effective_timeout();
    let policy = config.effective_retry_policy();

    tracing::info!(
        mode = %mode,
        runtime = %runtime.name(),
        requests = total,
        concurrency,
        timeout_ms = timeout.as_millis() as u64,
        max_retries = policy.max_retries,
        "Dispatching requests"
    );

    let tasks: Vec<Task<AgentResponse>> = requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| build_task(&runtime, request, index, mode, policy))
        .collect();
    let index_by_id: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| (task.id.clone(), index))
        .collect();

    let tracker = Arc::new(ProgressTracker {
        completed: AtomicUsize::new(0),
        total,
        on_progress: config.on_progress.clone(),
    });
    let options = RunOptions::new()
        .with_max_concurrency(concurrency)
        .with_timeout(timeout)
        .with_success_predicate(|response: &AgentResponse, _task| response.success)
        .with_callbacks(tracker);

    let scheduler = Scheduler::new();
    let task_results = scheduler.run(tasks, options).await?;

    let mut results: Vec<DispatchResult> = task_results
        .into_iter()
        .map(|result| {
            let index = result.metadata["index"]
                .as_u64()
                .map(|i| i as usize)
                .or_else(|| index_by_id.get(&result.task_id).copied())
                .unwrap_or(usize::MAX);
            into_dispatch_result(result, index, mode)
        })
        .collect();
    results.sort_by_key(|r| r.request_index);

    let summary = DispatchSummary::from_results(total, results, scheduler.metrics());
    tracing::info!(
        mode = %mode,
        succeeded = summary.success_count,
        failed = summary.failure_count,
        duration_ms = summary.metrics.total_duration_ms,
        "Dispatch finished"
    );

    if let Some(on_complete) = &config.on_complete {
        guard_sync("on_complete", || on_complete(&summary));
    }

    Ok(summary)
}

/// Dispatch every request in `mode`, returning results in input order
pub async fn run_dispatch(
    runtime: Arc<dyn AgentRuntime>,
    requests: Vec<AgentRequest>,
    mode: PromptMode,
    config: DispatchConfig,
) -> anyhow::Result<Vec<DispatchResult>> {
    Ok(dispatch_with_summary(runtime, requests, mode, config)
        .await?
        .results)
}

/// Fan queries out in parallel
pub async fn run_queries_parallel(
    runtime: Arc<dyn AgentRuntime>,
    requests: Vec<AgentRequest>,
    config: DispatchConfig,
) -> anyhow::Result<Vec<DispatchResult>> {
    run_dispatch(runtime, requests, PromptMode::Query, config).await
}

/// Fan executes out in parallel
pub async fn run_executes_parallel(
    runtime: Arc<dyn AgentRuntime>,
    requests: Vec<AgentRequest>,
    config: DispatchConfig,
) -> anyhow::Result<Vec<DispatchResult>> {
    run_dispatch(runtime, requests, PromptMode::Execute, config).await
}
