// ABOUTME: Bounded-concurrency scheduler running a batch of Tasks with per-task timeouts.
// ABOUTME: Workers share an atomic cursor; fail-fast stops new claims; results arrive in completion order.

use crate::cancel::{CancelReason, CancellationToken};
use crate::metrics::{self, RunMetrics};
use crate::task::{Task, TaskContext, TaskError, TaskResult};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Workers spawned when the caller does not say otherwise
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Classifies a resolved value as success or failure
pub type SuccessPredicate<T> = Arc<dyn Fn(&T, &Task<T>) -> bool + Send + Sync>;

/// Input contract violations, reported before any task starts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Duplicate task id: {id}")]
    DuplicateTaskId { id: String },
}

/// Lifecycle hooks fired by workers.
///
/// An `Err` (or a panic) from a hook is logged and otherwise ignored; hooks
/// never change a task's outcome.
#[async_trait]
pub trait TaskCallbacks<T: Send + Sync + 'static>: Send + Sync {
    async fn on_task_start(&self, _task: &Task<T>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired for tasks that resolved, whether or not they evaluated successful
    async fn on_task_complete(&self, _result: &TaskResult<T>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired for tasks that errored, timed out, or panicked
    async fn on_error(&self, _result: &TaskResult<T>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Callbacks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl<T: Send + Sync + 'static> TaskCallbacks<T> for NoCallbacks {}

/// Options for one Scheduler::run call
pub struct RunOptions<T> {
    /// Clamped to at least 1
    pub max_concurrency: usize,
    /// No per-task deadline when None
    pub timeout: Option<Duration>,
    /// Stop claiming new tasks after the first failure
    pub fail_fast: bool,
    /// Every resolved value counts as success when None
    pub evaluate_task_success: Option<SuccessPredicate<T>>,
    pub callbacks: Arc<dyn TaskCallbacks<T>>,
}

impl<T> Clone for RunOptions<T> {
    fn clone(&self) -> Self {
        Self {
            max_concurrency: self.max_concurrency,
            timeout: self.timeout,
            fail_fast: self.fail_fast,
            evaluate_task_success: self.evaluate_task_success.clone(),
            callbacks: Arc::clone(&self.callbacks),
        }
    }
}

impl<T: Send + Sync + 'static> Default for RunOptions<T> {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: None,
            fail_fast: false,
            evaluate_task_success: None,
            callbacks: Arc::new(NoCallbacks),
        }
    }
}

impl<T: Send + Sync + 'static> RunOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_success_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T, &Task<T>) -> bool + Send + Sync + 'static,
    {
        self.evaluate_task_success = Some(Arc::new(predicate));
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn TaskCallbacks<T>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    fn is_success(&self, value: &T, task: &Task<T>) -> bool {
        self.evaluate_task_success
            .as_ref()
            .map_or(true, |evaluate| evaluate(value, task))
    }
}

/// Runs batches of tasks under a concurrency bound.
///
/// Reusable; each run replaces the metrics snapshot of the previous one.
#[derive(Debug, Default)]
pub struct Scheduler {
    metrics: Mutex<RunMetrics>,
}

/// State shared by the workers of one run
struct RunState<T> {
    tasks: Vec<Task<T>>,
    options: RunOptions<T>,
    cursor: AtomicUsize,
    abort: AtomicBool,
    active: AtomicUsize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of the most recent run
    pub fn metrics(&self) -> RunMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_metrics(&self, metrics: RunMetrics) {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner()) = metrics;
    }

    /// Run every task, at most `max_concurrency` at a time.
    ///
    /// Returns one result per started task, in completion order. Under
    /// fail-fast, tasks never claimed have no result at all.
    pub async fn run<T>(
        &self,
        tasks: Vec<Task<T>>,
        options: RunOptions<T>,
    ) -> Result<Vec<TaskResult<T>>, SchedulerError>
    where
        T: Send + Sync + 'static,
    {
        {
            let mut seen = HashSet::with_capacity(tasks.len());
            for task in &tasks {
                if !seen.insert(task.id.as_str()) {
                    return Err(SchedulerError::DuplicateTaskId {
                        id: task.id.clone(),
                    });
                }
            }
        }

        if tasks.is_empty() {
            self.store_metrics(RunMetrics::default());
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let total = tasks.len();
        let workers = options.max_concurrency.max(1).min(total);

        tracing::info!(
            tasks = total,
            workers,
            timeout_ms = ?options.timeout.map(|t| t.as_millis() as u64),
            fail_fast = options.fail_fast,
            "Scheduler run starting"
        );

        let state = RunState {
            tasks,
            options,
            cursor: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker_loops: Vec<_> = (0..workers)
            .map(|worker| worker_loop(worker, &state, tx.clone()))
            .collect();
        drop(tx);
        futures::future::join_all(worker_loops).await;

        let mut results = Vec::with_capacity(total);
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }

        let run_metrics = RunMetrics::from_results(total, &results, started.elapsed());
        tracing::info!(
            started = run_metrics.started_tasks,
            succeeded = run_metrics.success_count,
            failed = run_metrics.failure_count,
            duration_ms = run_metrics.total_duration_ms,
            aborted_early = state.abort.load(Ordering::SeqCst),
            "Scheduler run finished"
        );
        self.store_metrics(run_metrics);

        Ok(results)
    }
}

async fn worker_loop<T>(
    worker: usize,
    state: &RunState<T>,
    results: mpsc::UnboundedSender<TaskResult<T>>,
) where
    T: Send + Sync + 'static,
{
    loop {
        if state.abort.load(Ordering::SeqCst) {
            tracing::debug!(worker, "Abort flag set, worker stopping");
            break;
        }

        let index = state.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(task) = state.tasks.get(index) else {
            break;
        };

        let result = execute_task(task, state).await;
        if results.send(result).is_err() {
            tracing::warn!(worker, index, "Result channel closed, dropping task result");
        }
    }
}

async fn execute_task<T>(task: &Task<T>, state: &RunState<T>) -> TaskResult<T>
where
    T: Send + Sync + 'static,
{
    let options = &state.options;
    guard_callback("on_task_start", &task.id, options.callbacks.on_task_start(task)).await;

    let token = CancellationToken::new();
    let ctx = TaskContext::new(task.id.clone(), token.clone());
    let started_at = Utc::now();
    let clock = Instant::now();

    metrics::set_active_tasks(state.active.fetch_add(1, Ordering::SeqCst) + 1);
    tracing::debug!(task_id = %task.id, "Task started");

    // The body runs on its own tokio task so a timed-out body can be left
    // behind; dropping the JoinHandle detaches it and its output is discarded.
    let mut handle = tokio::spawn(task.run(ctx));
    let outcome = match options.timeout {
        Some(timeout) => {
            tokio::select! {
                biased;
                joined = &mut handle => flatten_join(joined),
                _ = tokio::time::sleep(timeout) => {
                    let timeout_ms = timeout.as_millis() as u64;
                    token.cancel(CancelReason::Timeout { timeout_ms });
                    metrics::record_timeout();
                    tracing::warn!(task_id = %task.id, timeout_ms, "Task timed out");
                    Err(TaskError::Timeout {
                        task_id: task.id.clone(),
                        timeout_ms,
                    })
                }
            }
        }
        None => flatten_join(handle.await),
    };

    metrics::set_active_tasks(state.active.fetch_sub(1, Ordering::SeqCst) - 1);
    let duration = clock.elapsed();

    let mut result = TaskResult {
        task_id: task.id.clone(),
        success: false,
        value: None,
        error: None,
        duration_ms: duration.as_millis() as u64,
        started_at,
        finished_at: Utc::now(),
        metadata: task.metadata.clone(),
        aborted: token.is_cancelled(),
    };

    match outcome {
        Ok(value) => {
            result.success = options.is_success(&value, task);
            result.value = Some(value);
            tracing::debug!(
                task_id = %task.id,
                success = result.success,
                duration_ms = result.duration_ms,
                "Task resolved"
            );
            guard_callback(
                "on_task_complete",
                &task.id,
                options.callbacks.on_task_complete(&result),
            )
            .await;
        }
        Err(error) => {
            tracing::debug!(
                task_id = %task.id,
                error = %error,
                aborted = result.aborted,
                "Task failed"
            );
            result.error = Some(error);
            guard_callback("on_error", &task.id, options.callbacks.on_error(&result)).await;
        }
    }

    if options.fail_fast && !result.success && !state.abort.swap(true, Ordering::SeqCst) {
        tracing::info!(task_id = %task.id, "Fail-fast triggered, no further tasks will start");
    }

    metrics::record_task(result.success, duration);
    result
}

fn flatten_join<T>(joined: Result<anyhow::Result<T>, JoinError>) -> Result<T, TaskError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::from_anyhow(&err)),
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(panic = %message, "Task body panicked");
            Err(TaskError::Panicked { message })
        }
        Err(_) => Err(TaskError::Cancelled {
            reason: CancelReason::Aborted {
                message: "task was cancelled by the runtime".to_string(),
            },
        }),
    }
}

async fn guard_callback<F>(hook: &'static str, task_id: &str, callback: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(task_id = %task_id, hook, error = %e, "Callback failed"),
        Err(_) => tracing::error!(task_id = %task_id, hook, "Callback panicked"),
    }
}
