// ABOUTME: Cooperative cancellation token carrying the reason it was tripped.
// ABOUTME: Task bodies poll is_cancelled() or select! on cancelled() to stop early.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Why a token was tripped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// The scheduler's per-task deadline elapsed
    Timeout { timeout_ms: u64 },
    /// Someone asked the task to stop
    Aborted { message: String },
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Timeout { timeout_ms } => write!(f, "timed out after {}ms", timeout_ms),
            CancelReason::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}

/// Shared flag + reason, set at most once.
///
/// Clones observe the same state. Wraps `tokio_util`'s token so waiters can
/// be woken instead of polling.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    notify: tokio_util::sync::CancellationToken,
    reason: OnceLock<CancelReason>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. Returns false if it was already tripped; the first
    /// reason is kept.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let tripped = self.inner.reason.set(reason).is_ok();
        if tripped {
            self.inner.notify.cancel();
        }
        tripped
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().cloned()
    }

    /// Resolves once the token is tripped
    pub async fn cancelled(&self) {
        self.inner.notify.cancelled().await
    }
}
