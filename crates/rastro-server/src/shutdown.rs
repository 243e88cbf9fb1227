//! Shutdown signal and connection task tracking.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown token and the set of live connection tasks.
///
/// Connection loops watch [`token`](Self::token); the listener and every
/// upgraded socket task are awaited by [`graceful_shutdown`](Self::graceful_shutdown).
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker that connection tasks register with.
    pub fn connections(&self) -> TaskTracker {
        self.connections.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait for `handles` and all tracked connection
    /// tasks, giving up after `timeout`.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let _ = self.connections.close();
        info!(
            listeners = handles.len(),
            connections = self.connections.len(),
            ?timeout,
            "draining tasks"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.connections.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                connections = self.connections.len(),
                "drain timed out after {timeout:?}"
            );
        }
    }
}
