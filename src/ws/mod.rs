//! WebSocket layer: upgrade handler, per-connection task, lifecycle.
//!
//! Every client connected to `/ws` is a relay subscriber. Frames are raw
//! text: whatever is published is delivered verbatim.

pub mod connection;
pub mod handler;
pub mod lifecycle;

pub use connection::{ConnectionSettings, run_connection};
pub use lifecycle::{CloseReason, ConnectionLifecycle, ConnectionState};
