// ABOUTME: Parallel task execution engine for fanning prompts out to agents.
// ABOUTME: Bounded-concurrency scheduler, cooperative cancellation, retry and order-preserving dispatch.

pub mod cancel;
pub mod dispatch;
pub mod metrics;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use cancel::{CancelReason, CancellationToken};
pub use dispatch::{
    dispatch_with_summary, run_dispatch, run_executes_parallel, run_queries_parallel,
    DispatchConfig, DispatchError, DispatchResult, DispatchSummary,
};
pub use metrics::RunMetrics;
pub use retry::{run_with_retry, RetryPolicy, RetryPolicyConfig};
pub use scheduler::{NoCallbacks, RunOptions, Scheduler, SchedulerError, TaskCallbacks};
pub use task::{Task, TaskContext, TaskError, TaskResult};

// Re-export fanout-agent types used in dispatch signatures
pub use fanout_agent::{AgentRequest, AgentResponse, AgentRuntime, PromptMode};
