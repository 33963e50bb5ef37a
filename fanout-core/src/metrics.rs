// ABOUTME: Per-run execution metrics plus process-wide counters via the metrics facade.
// ABOUTME: RunMetrics is recomputed once per Scheduler::run and replaces the previous snapshot.

use crate::task::TaskResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate numbers for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Tasks handed to run()
    pub total_tasks: usize,
    /// Tasks that were claimed by a worker
    pub started_tasks: usize,
    /// Tasks that produced a result
    pub completed_tasks: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Wall-clock duration of the whole run
    pub total_duration_ms: u64,
    /// Mean of per-task durations
    pub average_duration_ms: f64,
    /// Completed tasks per second of wall-clock
    pub throughput: f64,
}

impl RunMetrics {
    pub fn from_results<T>(total_tasks: usize, results: &[TaskResult<T>], elapsed: Duration) -> Self {
        let completed = results.len();
        let success_count = results.iter().filter(|r| r.success).count();
        let total_duration_ms = elapsed.as_millis() as u64;

        let average_duration_ms = if completed == 0 {
            0.0
        } else {
            results.iter().map(|r| r.duration_ms as f64).sum::<f64>() / completed as f64
        };

        let throughput = if completed == 0 || total_duration_ms == 0 {
            0.0
        } else {
            completed as f64 / (total_duration_ms as f64 / 1000.0)
        };

        Self {
            total_tasks,
            started_tasks: completed,
            completed_tasks: completed,
            success_count,
            failure_count: completed - success_count,
            total_duration_ms,
            average_duration_ms,
            throughput,
        }
    }
}

/// Record one settled task
pub fn record_task(success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("fanout_tasks_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("fanout_task_duration_seconds").record(duration.as_secs_f64());
}

/// Record a task abandoned at its deadline
pub fn record_timeout() {
    ::metrics::counter!("fanout_task_timeouts_total").increment(1);
}

/// Record a retry attempt
pub fn record_retry() {
    ::metrics::counter!("fanout_task_retries_total").increment(1);
}

/// Record one dispatch call
pub fn record_dispatch(mode: &'static str, requests: usize) {
    ::metrics::counter!("fanout_dispatch_runs_total", "mode" => mode).increment(1);
    ::metrics::histogram!("fanout_dispatch_batch_size", "mode" => mode).record(requests as f64);
}

/// Track tasks currently running
pub fn set_active_tasks(count: usize) {
    ::metrics::gauge!("fanout_active_tasks").set(count as f64);
}
