//! Broadcast relay: the live subscriber set and permission-checked fan-out.

pub mod broadcast_relay;
pub mod subscriber;

pub use broadcast_relay::{BroadcastRelay, Delivery, InboundOutcome, InboundPolicy, RelayOptions};
pub use subscriber::{Offer, Subscriber, SubscriberId};
