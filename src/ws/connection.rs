//! Read/write loop for a single WebSocket connection.
//!
//! One task per connection. It forwards frames from the subscriber queue
//! to the socket, hands inbound text to the relay, and keeps the peer
//! alive with pings. Every exit path goes through
//! [`ConnectionLifecycle::close`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

use super::lifecycle::{CloseReason, ConnectionLifecycle};
use crate::relay::{BroadcastRelay, InboundOutcome};

/// Reply sent to a client whose inbound message was denied.
pub const ACCESS_DENIED_REPLY: &str = "access denied";

/// Per-connection tunables.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Capacity of the subscriber queue.
    pub queue_capacity: usize,
    /// Upper bound for writing one frame to the socket.
    pub send_timeout: Duration,
    /// Interval between server pings. A peer silent for two intervals is
    /// dropped.
    pub ping_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

type WsSink = SplitSink<WebSocket, Message>;

/// Runs one connection until it closes.
pub async fn run_connection(
    socket: WebSocket,
    relay: Arc<BroadcastRelay>,
    settings: ConnectionSettings,
) {
    let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), settings.queue_capacity);
    let mut queue = match lifecycle.open().await {
        Ok(rx) => rx,
        Err(err) => {
            tracing::warn!(error = %err, "could not open connection");
            return;
        }
    };
    let Some(id) = lifecycle.id() else {
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    let reason = loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                last_seen = Instant::now();
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match relay.on_message(id, text.as_str()).await {
                            InboundOutcome::Echo(echo) => Some(echo),
                            InboundOutcome::Denied => Some(ACCESS_DENIED_REPLY.to_string()),
                            InboundOutcome::Ignored | InboundOutcome::Published(_) => None,
                        };
                        if let Some(reply) = reply
                            && let Err(reason) =
                                send_frame(&mut ws_tx, Message::text(reply), settings.send_timeout).await
                        {
                            break reason;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        tracing::debug!(subscriber = %id, len = bytes.len(), "binary frame ignored");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => break CloseReason::ClientClose,
                    None => break CloseReason::PeerGone,
                    Some(Err(err)) => {
                        tracing::debug!(subscriber = %id, error = %err, "ws read failed");
                        break CloseReason::ProtocolError;
                    }
                }
            }
            queued = queue.recv() => {
                let Some(text) = queued else {
                    break CloseReason::Dropped;
                };
                if let Err(reason) =
                    send_frame(&mut ws_tx, Message::text(text), settings.send_timeout).await
                {
                    break reason;
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > settings.ping_interval * 2 {
                    break CloseReason::PeerGone;
                }
                if let Err(reason) =
                    send_frame(&mut ws_tx, Message::Ping(Vec::new().into()), settings.send_timeout).await
                {
                    break reason;
                }
            }
        }
    };

    lifecycle.close(reason).await;
    let _ = tokio::time::timeout(settings.send_timeout, ws_tx.close()).await;
    tracing::debug!(subscriber = %id, %reason, "ws connection finished");
}

async fn send_frame(sink: &mut WsSink, frame: Message, limit: Duration) -> Result<(), CloseReason> {
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(CloseReason::ProtocolError),
        Err(_) => Err(CloseReason::SendTimeout),
    }
}
