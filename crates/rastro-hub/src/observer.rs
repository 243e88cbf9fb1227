//! Push handle for one connected party.

use std::sync::Arc;

use rastro_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a push did not reach an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("send queue full")]
    QueueFull,
    #[error("connection closed")]
    Closed,
}

impl PushError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

/// A connected party that can receive broadcast payloads.
///
/// `push` must not block: it either hands the payload to the connection's
/// writer or fails immediately.
pub trait Observer: Send + Sync {
    fn id(&self) -> &ConnectionId;

    fn push(&self, payload: Arc<str>) -> Result<(), PushError>;

    /// Ask the owning connection to shut down. Idempotent.
    fn close(&self);
}

/// Shared handle as held by the registry.
pub type ObserverHandle = Arc<dyn Observer>;

/// Observer backed by a bounded queue drained by the connection's writer task.
pub struct ChannelObserver {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

impl ChannelObserver {
    /// Create an observer with a queue of `capacity` pending payloads.
    pub fn new(id: ConnectionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let observer = Arc::new(Self {
            id,
            tx,
            closed: CancellationToken::new(),
        });
        (observer, rx)
    }

    /// Resolves once [`Observer::close`] has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Observer for ChannelObserver {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn push(&self, payload: Arc<str>) -> Result<(), PushError> {
        if self.closed.is_cancelled() {
            return Err(PushError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

impl std::fmt::Debug for ChannelObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelObserver")
            .field("id", &self.id)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}
