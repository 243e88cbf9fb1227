//! Per-connection state machine.
//!
//! ```text
//! Connecting --activate--> Active --close--> Closed
//!      \______________________close_______/
//! ```
//!
//! The handler is socket-agnostic: the socket loop feeds it [`Inbound`]
//! frames and acts on the returned [`FrameOutcome`].

use std::sync::Arc;

use metrics::counter;
use rastro_core::{ConnectionId, DriverId, HubError, Location};
use rastro_hub::{BroadcastEngine, ChannelObserver, FanOut, Observer, ObserverHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::{MALFORMED_MESSAGES_TOTAL, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    ReadError(String),
    Malformed(String),
    /// Removed by the broadcaster after a failed push.
    Evicted,
    WriteFailed(String),
    HeartbeatTimeout,
    Shutdown,
    /// Handler dropped without an explicit close.
    Aborted,
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError(_) => "read_error",
            Self::Malformed(_) => "malformed",
            Self::Evicted => "evicted",
            Self::WriteFailed(_) => "write_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
            Self::Aborted => "aborted",
        }
    }
}

/// A frame as seen by the state machine.
#[derive(Clone, Copy, Debug)]
pub enum Inbound<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
    /// Ping or pong; counts as activity only.
    Control,
    Close,
}

#[derive(Debug)]
pub enum FrameOutcome {
    Published(FanOut),
    Ignored,
    Close(CloseReason),
}

#[derive(Debug, thiserror::Error)]
#[error("cannot {action} a connection in state {state:?}")]
pub struct TransitionError {
    pub action: &'static str,
    pub state: ConnectionState,
}

/// Lifecycle of one connection against the hub.
///
/// While `Active` the connection is registered as an observer and its
/// inbound locations are published under its own identifier. Leaving
/// `Active` always deregisters, including when the handler is dropped.
pub struct ConnectionHandler {
    id: ConnectionId,
    driver: DriverId,
    state: ConnectionState,
    engine: Arc<BroadcastEngine>,
    observer: Option<Arc<ChannelObserver>>,
    close_reason: Option<CloseReason>,
    published: u64,
}

impl ConnectionHandler {
    pub fn new(id: ConnectionId, engine: Arc<BroadcastEngine>) -> Self {
        Self {
            driver: DriverId::from(&id),
            id,
            state: ConnectionState::Connecting,
            engine,
            observer: None,
            close_reason: None,
            published: 0,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn observer(&self) -> Option<&Arc<ChannelObserver>> {
        self.observer.as_ref()
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Locations accepted from this connection so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Handshake done: register as an observer. Returns the queue the
    /// writer drains onto the socket.
    pub fn activate(&mut self, queue_capacity: usize) -> Result<mpsc::Receiver<Arc<str>>, TransitionError> {
        if self.state != ConnectionState::Connecting {
            return Err(TransitionError {
                action: "activate",
                state: self.state,
            });
        }
        let (observer, rx) = ChannelObserver::new(self.id.clone(), queue_capacity);
        self.engine.registry().register(observer.clone());
        self.observer = Some(observer);
        self.state = ConnectionState::Active;

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        info!(conn_id = %self.id, "connection active");
        Ok(rx)
    }

    /// Feed one inbound frame. Frames outside `Active` are ignored.
    pub fn on_frame(&mut self, frame: Inbound<'_>) -> FrameOutcome {
        if self.state != ConnectionState::Active {
            return FrameOutcome::Ignored;
        }
        match frame {
            Inbound::Text(text) => self.publish(Location::decode(text)),
            Inbound::Binary(bytes) => self.publish(Location::decode_bytes(bytes)),
            Inbound::Control => FrameOutcome::Ignored,
            Inbound::Close => FrameOutcome::Close(CloseReason::PeerClosed),
        }
    }

    fn publish(&mut self, decoded: Result<Location, HubError>) -> FrameOutcome {
        match decoded {
            Ok(location) => {
                self.published += 1;
                debug!(conn_id = %self.id, ?location, "location received");
                FrameOutcome::Published(self.engine.publish(self.driver.clone(), location))
            }
            Err(e) => {
                counter!(MALFORMED_MESSAGES_TOTAL).increment(1);
                warn!(conn_id = %self.id, error = %e, "malformed location message");
                FrameOutcome::Close(CloseReason::Malformed(e.to_string()))
            }
        }
    }

    /// Move to `Closed`: deregister and close the observer.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        let was_active = self.state == ConnectionState::Active;
        self.state = ConnectionState::Closed;

        if let Some(observer) = self.observer.take() {
            observer.close();
            let handle: ObserverHandle = observer;
            let _ = self.engine.registry().deregister(&handle);
        }
        if was_active {
            counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.label()).increment(1);
            info!(
                conn_id = %self.id,
                reason = reason.label(),
                published = self.published,
                "connection closed"
            );
        }
        self.close_reason = Some(reason);
        true
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        let _ = self.close(CloseReason::Aborted);
    }
}
