//! Socket loops for one upgraded connection.
//!
//! The calling task reads frames and feeds them to the [`ConnectionHandler`];
//! a spawned writer drains the observer queue onto the socket and sends
//! pings. Whichever side finishes first ends the connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rastro_hub::{ChannelObserver, Observer};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::handler::{CloseReason, ConnectionHandler, FrameOutcome, Inbound};
use crate::config::ServerConfig;

type WsSink = SplitSink<WebSocket, Message>;

/// Run `handler` over `socket` until the connection ends.
pub async fn serve_socket(
    socket: WebSocket,
    mut handler: ConnectionHandler,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> CloseReason {
    let rx = match handler.activate(config.send_queue_capacity) {
        Ok(rx) => rx,
        Err(e) => {
            warn!(conn_id = %handler.id(), error = %e, "connection not activated");
            return CloseReason::Aborted;
        }
    };
    let Some(observer) = handler.observer().cloned() else {
        return CloseReason::Aborted;
    };

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        Arc::clone(&observer),
        config.write_timeout(),
        config.heartbeat_interval(),
    ));
    let mut writer_done = false;

    let heartbeat_timeout = config.heartbeat_timeout();
    let mut liveness = time::interval(config.heartbeat_interval());
    liveness.tick().await; // consume first immediate tick
    let mut last_activity = Instant::now();

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(message)) => {
                    last_activity = Instant::now();
                    if let FrameOutcome::Close(reason) = handler.on_frame(inbound(&message)) {
                        break reason;
                    }
                }
                Some(Err(e)) => break CloseReason::ReadError(e.to_string()),
                None => break CloseReason::PeerClosed,
            },
            result = &mut writer => {
                writer_done = true;
                break result.unwrap_or_else(|e| CloseReason::WriteFailed(e.to_string()));
            }
            () = observer.closed() => break CloseReason::Evicted,
            () = shutdown.cancelled() => break CloseReason::Shutdown,
            _ = liveness.tick() => {
                if last_activity.elapsed() >= heartbeat_timeout {
                    break CloseReason::HeartbeatTimeout;
                }
            }
        }
    };

    let _ = handler.close(reason.clone());
    if !writer_done && time::timeout(config.write_timeout(), &mut writer).await.is_err() {
        writer.abort();
    }
    reason
}

fn inbound(message: &Message) -> Inbound<'_> {
    match message {
        Message::Text(text) => Inbound::Text(text.as_str()),
        Message::Binary(bytes) => Inbound::Binary(bytes.as_ref()),
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(_) => Inbound::Close,
    }
}

async fn write_loop(
    mut ws_tx: WsSink,
    mut rx: mpsc::Receiver<Arc<str>>,
    observer: Arc<ChannelObserver>,
    write_timeout: Duration,
    ping_every: Duration,
) -> CloseReason {
    let mut ping = time::interval(ping_every);
    ping.tick().await; // consume first immediate tick

    let reason = loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    break CloseReason::Evicted;
                };
                let message = Message::Text(payload.to_string().into());
                if let Err(reason) = send(&mut ws_tx, message, write_timeout).await {
                    break reason;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) = send(&mut ws_tx, Message::Ping(Vec::new().into()), write_timeout).await {
                    break reason;
                }
                trace!(conn_id = %observer.id(), "sent ping");
            }
            () = observer.closed() => break CloseReason::Evicted,
        }
    };

    let _ = time::timeout(write_timeout, ws_tx.send(Message::Close(None))).await;
    reason
}

/// One bounded socket write.
async fn send(ws_tx: &mut WsSink, message: Message, limit: Duration) -> Result<(), CloseReason> {
    match time::timeout(limit, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseReason::WriteFailed(e.to_string())),
        Err(_) => Err(CloseReason::WriteFailed(format!("write timed out after {limit:?}"))),
    }
}
