//! Permission-checked fan-out to every live subscriber.
//!
//! [`BroadcastRelay`] exclusively owns the live subscriber set. Messages
//! enter through [`BroadcastRelay::publish`], are checked once against
//! the [`DeviceRegistry`], and are then offered to a snapshot of the set.
//! Each subscriber has its own bounded queue, so a stalled client can only
//! lose its own messages (and eventually its connection).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::subscriber::{Offer, Subscriber, SubscriberId};
use crate::domain::DeviceRegistry;
use crate::domain::message::scope_prefix;
use crate::error::RelayError;

/// What the relay does with text a subscriber sends on its own socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InboundPolicy {
    /// Log it and do nothing else.
    #[default]
    Ignore,
    /// Send it back to the sender only.
    Echo,
    /// Treat it exactly like a `publish` call.
    Publish,
}

impl FromStr for InboundPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "echo" => Ok(Self::Echo),
            "publish" => Ok(Self::Publish),
            other => Err(RelayError::InvalidRequest(format!(
                "unknown inbound policy: {other}"
            ))),
        }
    }
}

/// Tunables for a [`BroadcastRelay`].
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Consecutive full-queue messages tolerated before eviction.
    pub max_strikes: u32,
    /// Handling of raw inbound socket messages.
    pub inbound_policy: InboundPolicy,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_strikes: 3,
            inbound_policy: InboundPolicy::Ignore,
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Delivery {
    /// Subscribers whose queue accepted the message.
    pub recipients: usize,
    /// Subscribers that missed the message because their queue was full.
    pub dropped: usize,
    /// Subscribers removed during this fan-out (overflowed or gone).
    pub evicted: usize,
}

/// What the connection should do after an inbound socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Nothing to send.
    Ignored,
    /// Write this text back to the sender.
    Echo(String),
    /// The message was broadcast.
    Published(Delivery),
    /// The message was device-scoped and the device is locked.
    Denied,
}

/// Live subscriber set plus permission-gated broadcast.
#[derive(Debug)]
pub struct BroadcastRelay {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    // Only written while holding the `subscribers` write lock.
    closed: AtomicBool,
    registry: Arc<DeviceRegistry>,
    options: RelayOptions,
}

impl BroadcastRelay {
    /// Creates a relay with an empty subscriber set.
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, options: RelayOptions) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            registry,
            options,
        }
    }

    /// Returns the registry consulted for device-scoped messages.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Returns the configured inbound policy.
    #[must_use]
    pub const fn inbound_policy(&self) -> InboundPolicy {
        self.options.inbound_policy
    }

    /// Adds a subscriber to the live set.
    ///
    /// Returns `false` once [`BroadcastRelay::shutdown`] has run; the
    /// subscriber is dropped, which closes its queue.
    pub async fn on_connect(&self, subscriber: Subscriber) -> bool {
        let id = subscriber.id();
        let count = {
            let mut set = self.subscribers.write().await;
            if self.closed.load(Ordering::Acquire) {
                drop(set);
                tracing::debug!(subscriber = %id, "relay shut down, connection refused");
                return false;
            }
            set.insert(id, subscriber);
            set.len()
        };
        tracing::info!(subscriber = %id, subscribers = count, "subscriber connected");
        true
    }

    /// Handles text a subscriber sent on its own socket.
    pub async fn on_message(&self, id: SubscriberId, text: &str) -> InboundOutcome {
        tracing::debug!(subscriber = %id, message = text, "inbound message");
        match self.options.inbound_policy {
            InboundPolicy::Ignore => InboundOutcome::Ignored,
            InboundPolicy::Echo => InboundOutcome::Echo(text.to_string()),
            InboundPolicy::Publish => match self.publish(text).await {
                Ok(delivery) => InboundOutcome::Published(delivery),
                Err(_) => InboundOutcome::Denied,
            },
        }
    }

    /// Removes a subscriber from the live set.
    ///
    /// Safe to call for ids that were never registered or were already
    /// removed. Returns `true` if the subscriber was present.
    pub async fn on_disconnect(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut set = self.subscribers.write().await;
            let removed = set.remove(&id).is_some();
            (removed, set.len())
        };
        if removed {
            tracing::info!(subscriber = %id, subscribers = count, "subscriber disconnected");
        }
        removed
    }

    /// Broadcasts `message` unless it is scoped to a locked device.
    ///
    /// The message is delivered unmodified. Unknown prefixes are unscoped
    /// and always allowed.
    ///
    /// A device-scoped message holds the device's gate from the permission
    /// check until the fan-out completes, so it is either delivered before
    /// a concurrent revoke starts or denied by it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AccessDenied`] if the prefix names a
    /// registered device whose permission is `false`. Nothing is sent in
    /// that case.
    pub async fn publish(&self, message: &str) -> Result<Delivery, RelayError> {
        let Some(prefix) = scope_prefix(message) else {
            return Ok(self.fan_out(message).await);
        };
        let Ok(_gate) = self.registry.lock_device(prefix).await else {
            return Ok(self.fan_out(message).await);
        };
        if self.registry.permission(prefix).await != Some(true) {
            tracing::warn!(device = prefix, "publish denied: device locked");
            return Err(RelayError::AccessDenied {
                device: prefix.to_string(),
            });
        }
        Ok(self.fan_out(message).await)
    }

    /// Offers `message` to every current subscriber without any
    /// permission check.
    ///
    /// Works on a snapshot of the set, so concurrent connects and
    /// disconnects neither block nor abort delivery to the others.
    pub async fn fan_out(&self, message: &str) -> Delivery {
        let snapshot: Vec<Subscriber> = self.subscribers.read().await.values().cloned().collect();

        let mut delivery = Delivery::default();
        let mut evict = Vec::new();
        for subscriber in &snapshot {
            match subscriber.offer(message, self.options.max_strikes) {
                Offer::Queued => delivery.recipients += 1,
                Offer::Dropped => {
                    tracing::debug!(subscriber = %subscriber.id(), "queue full, message dropped");
                    delivery.dropped += 1;
                }
                Offer::Overflowed => {
                    tracing::warn!(subscriber = %subscriber.id(), "queue persistently full, evicting");
                    delivery.dropped += 1;
                    evict.push(subscriber.id());
                }
                Offer::Closed => evict.push(subscriber.id()),
            }
        }

        if !evict.is_empty() {
            let mut set = self.subscribers.write().await;
            for id in &evict {
                if set.remove(id).is_some() {
                    delivery.evicted += 1;
                }
            }
        }

        tracing::debug!(
            recipients = delivery.recipients,
            dropped = delivery.dropped,
            evicted = delivery.evicted,
            "fan-out complete"
        );
        delivery
    }

    /// Returns the number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drops every subscriber, which closes their connections, and refuses
    /// later connects. Returns the number removed.
    pub async fn shutdown(&self) -> usize {
        let drained = {
            let mut set = self.subscribers.write().await;
            self.closed.store(true, Ordering::Release);
            let count = set.len();
            set.clear();
            count
        };
        tracing::info!(subscribers = drained, "relay shut down");
        drained
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::device_registry::tests::broadcast_device;

    fn make_relay(policy: InboundPolicy) -> BroadcastRelay {
        let Ok(registry) = DeviceRegistry::from_descriptors([broadcast_device("X")]) else {
            panic!("registry rejected");
        };
        BroadcastRelay::new(
            Arc::new(registry),
            RelayOptions {
                max_strikes: 2,
                inbound_policy: policy,
            },
        )
    }

    async fn connect(
        relay: &BroadcastRelay,
        capacity: usize,
    ) -> (SubscriberId, tokio::sync::mpsc::Receiver<String>) {
        let (subscriber, rx) = Subscriber::channel(capacity);
        let id = subscriber.id();
        assert!(relay.on_connect(subscriber).await);
        (id, rx)
    }

    #[tokio::test]
    async fn locked_device_message_is_not_broadcast() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, mut rx) = connect(&relay, 8).await;

        let result = relay.publish("X_hello").await;
        assert!(matches!(result, Err(RelayError::AccessDenied { device }) if device == "X"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unlocked_device_message_is_broadcast() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, mut rx) = connect(&relay, 8).await;
        let _ = relay.registry().set_permission("X", true).await;

        let Ok(delivery) = relay.publish("X_hello").await else {
            panic!("publish denied");
        };
        assert_eq!(delivery.recipients, 1);
        assert_eq!(rx.recv().await.as_deref(), Some("X_hello"));
    }

    #[tokio::test]
    async fn unknown_prefix_is_delivered_verbatim_to_all() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, mut rx1) = connect(&relay, 8).await;
        let (_, mut rx2) = connect(&relay, 8).await;

        let Ok(delivery) = relay.publish("Y_hello").await else {
            panic!("publish denied");
        };
        assert_eq!(delivery.recipients, 2);
        assert_eq!(rx1.recv().await.as_deref(), Some("Y_hello"));
        assert_eq!(rx2.recv().await.as_deref(), Some("Y_hello"));
    }

    #[tokio::test]
    async fn gone_subscriber_does_not_abort_fan_out() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, rx_a) = connect(&relay, 8).await;
        let (_, mut rx_b) = connect(&relay, 8).await;
        // A's task died without deregistering.
        drop(rx_a);

        let Ok(delivery) = relay.publish("status").await else {
            panic!("publish failed");
        };
        assert_eq!(delivery.recipients, 1);
        assert_eq!(delivery.evicted, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("status"));
        assert_eq!(relay.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_during_publish_is_safe() {
        let relay = Arc::new(make_relay(InboundPolicy::Ignore));
        let (id_a, _rx_a) = connect(&relay, 64).await;
        let (_, mut rx_b) = connect(&relay, 64).await;

        let publisher = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let mut ok = 0;
                for i in 0..32 {
                    if relay.publish(&format!("m{i}")).await.is_ok() {
                        ok += 1;
                    }
                }
                ok
            })
        };
        let _ = relay.on_disconnect(id_a).await;

        let Ok(ok) = publisher.await else {
            panic!("publisher panicked");
        };
        assert_eq!(ok, 32);
        let mut received = 0;
        while rx_b.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 32);
    }

    #[tokio::test]
    async fn stalled_subscriber_is_evicted() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, _stalled) = connect(&relay, 1).await;
        let (_, mut healthy) = connect(&relay, 16).await;

        for i in 0..3 {
            let _ = relay.publish(&format!("m{i}")).await;
        }
        assert_eq!(relay.subscriber_count().await, 1);
        let mut received = 0;
        while healthy.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (id, _rx) = connect(&relay, 1).await;
        assert!(relay.on_disconnect(id).await);
        assert!(!relay.on_disconnect(id).await);
        assert!(!relay.on_disconnect(SubscriberId::new()).await);
    }

    #[tokio::test]
    async fn inbound_policies() {
        let ignore = make_relay(InboundPolicy::Ignore);
        assert_eq!(
            ignore.on_message(SubscriberId::new(), "hi").await,
            InboundOutcome::Ignored
        );

        let echo = make_relay(InboundPolicy::Echo);
        assert_eq!(
            echo.on_message(SubscriberId::new(), "hi").await,
            InboundOutcome::Echo("hi".to_string())
        );

        let publish = make_relay(InboundPolicy::Publish);
        let (id, mut rx) = connect(&publish, 4).await;
        assert!(matches!(
            publish.on_message(id, "hi").await,
            InboundOutcome::Published(Delivery { recipients: 1, .. })
        ));
        assert_eq!(rx.recv().await.as_deref(), Some("hi"));
        assert_eq!(publish.on_message(id, "X_ON").await, InboundOutcome::Denied);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert!(matches!("ECHO".parse::<InboundPolicy>(), Ok(InboundPolicy::Echo)));
        assert!(matches!("publish".parse::<InboundPolicy>(), Ok(InboundPolicy::Publish)));
        assert!("loud".parse::<InboundPolicy>().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_queues() {
        let relay = make_relay(InboundPolicy::Ignore);
        let (_, mut rx) = connect(&relay, 1).await;
        assert_eq!(relay.shutdown().await, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn connect_after_shutdown_is_refused() {
        let relay = make_relay(InboundPolicy::Ignore);
        let _ = relay.shutdown().await;
        let (subscriber, mut rx) = Subscriber::channel(4);
        assert!(!relay.on_connect(subscriber).await);
        assert_eq!(relay.subscriber_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn revoke_waits_for_in_flight_scoped_publish() {
        let relay = Arc::new(make_relay(InboundPolicy::Ignore));
        let (_, mut rx) = connect(&relay, 8).await;
        let _ = relay.registry().set_permission("X", true).await;

        // Stall the fan-out after the permission check has passed.
        let stall = relay.subscribers.write().await;
        let publisher = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.publish("X_ON").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Same sequence the dispatcher runs for a revoke.
        let revoker = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let Ok(_gate) = relay.registry().lock_device("X").await else {
                    panic!("device missing");
                };
                let _ = relay.registry().set_permission("X", false).await;
                relay.fan_out("X_OFF").await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!revoker.is_finished());
        assert_eq!(relay.registry().permission("X").await, Some(true));

        drop(stall);
        let Ok(Ok(delivery)) = publisher.await else {
            panic!("publish should complete before the revoke");
        };
        assert_eq!(delivery.recipients, 1);
        let Ok(_) = revoker.await else {
            panic!("revoker panicked");
        };
        assert_eq!(rx.recv().await.as_deref(), Some("X_ON"));
        assert_eq!(rx.recv().await.as_deref(), Some("X_OFF"));
        assert!(matches!(
            relay.publish("X_ON").await,
            Err(RelayError::AccessDenied { .. })
        ));
    }
}
