//! Shutdown coordination for graceful server shutdown.
//!
//! A single `ShutdownState` is created by the application and a clone is
//! handed to the accept loop and to every connection worker when it is
//! spawned. Workers check it once per relay iteration and can also await it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared cancellation token for the accept loop and all connection workers.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// `true` once shutdown has been initiated; never goes back to `false`
    shutdown_initiated: Arc<watch::Sender<bool>>,
}

impl ShutdownState {
    /// Creates a new shutdown state that has not been triggered.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            shutdown_initiated: Arc::new(sender),
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.shutdown_initiated.borrow()
    }

    /// Initiates shutdown. Idempotent.
    pub fn initiate_shutdown(&self) {
        let was_initiated = self.shutdown_initiated.send_replace(true);
        if !was_initiated {
            info!("🛑 Shutdown initiated - relays will be stopped");
        }
    }

    /// Completes once shutdown has been initiated.
    ///
    /// Cancel safe: it only waits on a watch receiver, so it can sit in a
    /// `tokio::select!` branch and be dropped at any time.
    pub async fn initiated(&self) {
        let mut receiver = self.shutdown_initiated.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|initiated| *initiated).await;
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initiated_wakes_waiters() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_initiated());

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.initiated().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake up")
            .expect("waiter task should not panic");
        assert!(state.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_initiated_returns_immediately_when_already_set() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        state.initiate_shutdown();

        tokio::time::timeout(Duration::from_millis(100), state.initiated())
            .await
            .expect("already-initiated state should not block");
    }
}
