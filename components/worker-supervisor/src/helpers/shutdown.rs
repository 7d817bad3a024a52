// External crates
use std::sync::Arc;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Process-wide interrupt, built on top of a cancellation token.
///
/// - Clones share one token; `.subscribe()` hands out child tokens to
///   long-running loops (monitor, stop-command watcher).
/// - `.trigger()` records why the process is stopping and wakes every
///   subscriber. Only the first reason is kept.
/// - Triggering is idempotent; later calls are no-ops.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<&'static str>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Fresh, untriggered interrupt.
    #[instrument(
        name = "worker_shutdown_channel",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn new() -> Self {
        tracing::trace!("Creating process interrupt");
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Token cancelled when the process is interrupted.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Interrupt the process.
    #[instrument(
        name = "worker_shutdown_trigger",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn trigger(&self, reason: &'static str) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(reason, "Shutdown triggered");
        }
        self.token.cancel();
    }

    /// Whether `.trigger()` has been called.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// First reason passed to `.trigger()`.
    pub fn reason(&self) -> Option<&'static str> {
        self.reason.get().copied()
    }

    /// Wait until `.trigger()` is called.
    pub async fn wait_for_shutdown(&self) {
        tracing::trace!("Waiting for shutdown signal");
        self.token.cancelled().await;
        tracing::trace!(reason = ?self.reason(), "Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_subscribers_and_keeps_first_reason() {
        let shutdown = Shutdown::new();
        let child = shutdown.subscribe();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_shutdown().await })
        };

        shutdown.trigger("signal");
        shutdown.trigger("later");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(child.is_cancelled());
        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.reason(), Some("signal"));
    }
}
