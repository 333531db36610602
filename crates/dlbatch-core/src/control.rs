//! Run-wide cancellation.
//!
//! One `CancellationSignal` is shared by the orchestrator, every worker and
//! every supervised process. Once set it stays set for the rest of the run:
//! workers stop taking jobs and running downloaders are terminated.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; there is no way to reset it.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("cancellation requested");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `cancel` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `duration` unless cancelled first. Returns false if cancelled.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
