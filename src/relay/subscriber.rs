//! Subscriber handles: one per live connection.
//!
//! A [`Subscriber`] is the relay-side half of a bounded queue; the
//! connection task owns the receiving half and writes whatever arrives to
//! its socket. Dropping every `Subscriber` clone closes the queue, which
//! ends the connection.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

/// Identity of one physical connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(uuid::Uuid);

impl SubscriberId {
    /// Creates a new random `SubscriberId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of offering one message to a subscriber's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Queued for delivery.
    Queued,
    /// Queue full; the message was dropped for this subscriber.
    Dropped,
    /// Queue full for too many consecutive messages; evict the subscriber.
    Overflowed,
    /// The connection task is gone.
    Closed,
}

/// Relay-side handle to a live connection.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<String>,
    strikes: Arc<AtomicU32>,
}

impl Subscriber {
    /// Creates a subscriber and the receiving end of its bounded queue.
    ///
    /// A `capacity` of zero is treated as one.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: SubscriberId::new(),
            tx,
            strikes: Arc::new(AtomicU32::new(0)),
        };
        (subscriber, rx)
    }

    /// Returns this subscriber's id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Enqueues `message` without waiting.
    ///
    /// Consecutive full-queue offers are counted; the `max_strikes`-th one
    /// reports [`Offer::Overflowed`]. A successful offer resets the count.
    pub fn offer(&self, message: &str, max_strikes: u32) -> Offer {
        match self.tx.try_send(message.to_string()) {
            Ok(()) => {
                self.strikes.store(0, Ordering::Relaxed);
                Offer::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let strikes = self.strikes.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                if strikes >= max_strikes {
                    Offer::Overflowed
                } else {
                    Offer::Dropped
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Returns `true` once the connection task dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
