// ABOUTME: Task model for the scheduler - runnable units, their context, and their results.
// ABOUTME: TaskError is the per-task failure taxonomy recovered into every TaskResult.

use crate::cancel::{CancelReason, CancellationToken};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

type TaskFn<T> = dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;

/// A named unit of asynchronous work.
///
/// The runnable is shared, so cloning a task is cheap and the scheduler can
/// move the body onto its own tokio task.
pub struct Task<T> {
    pub id: String,
    /// Opaque bag copied verbatim into the task's result
    pub metadata: Value,
    run: Arc<TaskFn<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F, Fut>(id: impl Into<String>, run: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            id: id.into(),
            metadata: Value::Null,
            run: Arc::new(move |ctx| Box::pin(run(ctx))),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Start the body with the given context
    pub fn run(&self, ctx: TaskContext) -> BoxFuture<'static, anyhow::Result<T>> {
        (self.run)(ctx)
    }
}

/// Passed to every run() invocation
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Why a task did not produce a value
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The body returned an error
    #[error("{message}")]
    Failed { message: String },

    /// The deadline elapsed before the body settled
    #[error("Task {task_id} timed out after {timeout_ms}ms")]
    Timeout { task_id: String, timeout_ms: u64 },

    /// The body stopped because its token was tripped
    #[error("Task cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    /// The body panicked
    #[error("Task panicked: {message}")]
    Panicked { message: String },
}

impl TaskError {
    /// Recover a TaskError raised through anyhow, or wrap any other error
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<TaskError>() {
            Some(task_err) => task_err.clone(),
            None => TaskError::Failed {
                message: format!("{:#}", err),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}

/// Outcome of one started task, produced exactly once
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult<T> {
    pub task_id: String,
    pub success: bool,
    /// Present on success and on evaluated failures
    pub value: Option<T>,
    pub error: Option<TaskError>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metadata: Value,
    /// Whether the task's token was tripped when it settled
    pub aborted: bool,
}

impl<T> TaskResult<T> {
    /// Error message, if the task failed with an error
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}
