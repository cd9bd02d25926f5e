//! Per-connection lifecycle: `Connecting -> Open -> Closed`.
//!
//! [`ConnectionLifecycle`] is the only place that registers a connection
//! with the relay and the only place that deregisters it, so each
//! physical connection produces at most one `on_connect` and exactly one
//! matching `on_disconnect`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::relay::{BroadcastRelay, Subscriber, SubscriberId};

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, not yet registered.
    Connecting,
    /// Registered with the relay.
    Open,
    /// Terminal.
    Closed,
}

/// Why a connection ended. Closing is expected and never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClose,
    /// The stream ended or the peer stopped answering pings.
    PeerGone,
    /// A frame could not be read or written.
    ProtocolError,
    /// A socket write did not finish in time.
    SendTimeout,
    /// The relay dropped the subscriber (overflow or shutdown).
    Dropped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClose => "client_close",
            Self::PeerGone => "peer_gone",
            Self::ProtocolError => "protocol_error",
            Self::SendTimeout => "send_timeout",
            Self::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// State machine tying one connection to the relay's subscriber set.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    relay: Arc<BroadcastRelay>,
    queue_capacity: usize,
    state: ConnectionState,
    id: Option<SubscriberId>,
}

impl ConnectionLifecycle {
    /// Creates a lifecycle in [`ConnectionState::Connecting`].
    #[must_use]
    pub fn new(relay: Arc<BroadcastRelay>, queue_capacity: usize) -> Self {
        Self {
            relay,
            queue_capacity,
            state: ConnectionState::Connecting,
            id: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Subscriber id, once open.
    #[must_use]
    pub const fn id(&self) -> Option<SubscriberId> {
        self.id
    }

    /// Registers a fresh subscriber with the relay and returns the
    /// receiving end of its queue.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] unless the state is
    /// [`ConnectionState::Connecting`]; a closed connection is never
    /// reopened. Also fails, leaving the state
    /// [`ConnectionState::Closed`], if the relay has shut down.
    pub async fn open(&mut self) -> Result<mpsc::Receiver<String>, RelayError> {
        if self.state != ConnectionState::Connecting {
            return Err(RelayError::InvalidRequest(format!(
                "cannot open a connection in state {:?}",
                self.state
            )));
        }
        let (subscriber, rx) = Subscriber::channel(self.queue_capacity);
        let id = subscriber.id();
        if !self.relay.on_connect(subscriber).await {
            self.state = ConnectionState::Closed;
            return Err(RelayError::InvalidRequest(
                "relay is shutting down".to_string(),
            ));
        }
        self.id = Some(id);
        self.state = ConnectionState::Open;
        Ok(rx)
    }

    /// Moves to [`ConnectionState::Closed`], deregistering if open.
    ///
    /// Returns `true` only for the call that performed the `Open -> Closed`
    /// transition; later calls are no-ops.
    pub async fn close(&mut self, reason: CloseReason) -> bool {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        match (previous, self.id) {
            (ConnectionState::Open, Some(id)) => {
                self.relay.on_disconnect(id).await;
                tracing::debug!(subscriber = %id, %reason, "connection closed");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::DeviceRegistry;
    use crate::relay::RelayOptions;

    fn make_relay() -> Arc<BroadcastRelay> {
        Arc::new(BroadcastRelay::new(
            Arc::new(DeviceRegistry::new()),
            RelayOptions::default(),
        ))
    }

    #[tokio::test]
    async fn open_registers_and_close_deregisters_once() {
        let relay = make_relay();
        let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);

        let Ok(_rx) = lifecycle.open().await else {
            panic!("open failed");
        };
        assert_eq!(lifecycle.state(), ConnectionState::Open);
        assert_eq!(relay.subscriber_count().await, 1);

        assert!(lifecycle.close(CloseReason::PeerGone).await);
        assert!(!lifecycle.close(CloseReason::ClientClose).await);
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(relay.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn closed_is_terminal() {
        let relay = make_relay();
        let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        let _ = lifecycle.open().await;
        let _ = lifecycle.close(CloseReason::ClientClose).await;
        assert!(lifecycle.open().await.is_err());
        assert_eq!(relay.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn close_before_open_touches_nothing() {
        let relay = make_relay();
        let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        assert!(!lifecycle.close(CloseReason::ProtocolError).await);
        assert!(lifecycle.open().await.is_err());
    }

    #[tokio::test]
    async fn reconnect_gets_new_identity() {
        let relay = make_relay();
        let mut first = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        let _ = first.open().await;
        let _ = first.close(CloseReason::PeerGone).await;

        let mut second = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        let _ = second.open().await;
        assert_ne!(first.id(), second.id());
        assert_eq!(relay.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn close_after_eviction_is_still_one_transition() {
        let relay = make_relay();
        let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        let Ok(mut rx) = lifecycle.open().await else {
            panic!("open failed");
        };
        let _ = relay.shutdown().await;
        assert!(rx.recv().await.is_none());
        assert!(lifecycle.close(CloseReason::Dropped).await);
        assert!(!lifecycle.close(CloseReason::Dropped).await);
    }

    #[tokio::test]
    async fn open_after_shutdown_fails_and_closes() {
        let relay = make_relay();
        let _ = relay.shutdown().await;
        let mut lifecycle = ConnectionLifecycle::new(Arc::clone(&relay), 4);
        assert!(lifecycle.open().await.is_err());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(lifecycle.id(), None);
        assert_eq!(relay.subscriber_count().await, 0);
        assert!(!lifecycle.close(CloseReason::Dropped).await);
    }
}
