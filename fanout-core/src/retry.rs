// ABOUTME: Bounded-attempt retry around one task body with an interruptible delay.
// ABOUTME: Unsuccessful values and errors are retried; only the final attempt's outcome is returned.

use crate::cancel::{CancelReason, CancellationToken};
use crate::metrics;
use crate::task::TaskError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Resolved retry behavior for one dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Partially specified policy as it arrives from config; each field is
/// defaulted on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl RetryPolicyConfig {
    pub fn resolve(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        }
    }
}

fn cancelled(token: &CancellationToken) -> anyhow::Error {
    let reason = token.reason().unwrap_or_else(|| CancelReason::Aborted {
        message: "cancelled".to_string(),
    });
    anyhow::Error::new(TaskError::Cancelled { reason })
}

/// Run `operation` up to `max_retries + 1` times.
///
/// - a value accepted by `is_success` returns immediately
/// - an unsuccessful value or an error with attempts left waits `retry_delay`, then retries
/// - on the final attempt an unsuccessful value is returned as-is and an error is propagated
///
/// A tripped token stops the loop before the next attempt, during an attempt,
/// or during the delay, with `TaskError::Cancelled`.
pub async fn run_with_retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    label: &str,
    mut operation: F,
    is_success: P,
) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    P: Fn(&T) -> bool,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        if token.is_cancelled() {
            return Err(cancelled(token));
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(cancelled(token)),
            outcome = operation(attempt) => outcome,
        };
        let is_last = attempt >= max_attempts;

        match outcome {
            Ok(value) if is_success(&value) => {
                if attempt > 1 {
                    tracing::debug!(task = %label, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Ok(value) if is_last => {
                tracing::debug!(task = %label, attempt, "Final attempt unsuccessful, returning result");
                return Ok(value);
            }
            Err(e) if is_last => {
                tracing::debug!(task = %label, attempt, error = %e, "Final attempt failed");
                return Err(e);
            }
            Ok(_) => {
                tracing::warn!(
                    task = %label,
                    attempt,
                    max_attempts,
                    delay_ms = policy.retry_delay.as_millis() as u64,
                    "Operation unsuccessful, retrying"
                );
            }
            Err(e) => {
                tracing::warn!(
                    task = %label,
                    attempt,
                    max_attempts,
                    delay_ms = policy.retry_delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
            }
        }

        metrics::record_retry();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(cancelled(token)),
            _ = tokio::time::sleep(policy.retry_delay) => {}
        }
        attempt += 1;
    }
}
