//! # mcu-relay
//!
//! Control panel backend for remote microcontroller devices.
//!
//! Authorized operators toggle devices on and off and relay free-form
//! status messages between connected clients. The core is a
//! permission-gated publish/subscribe relay: WebSocket clients are
//! subscribers, every published message fans out to all of them, and
//! messages prefixed with a device id (`"mbed_ON"`) only pass while that
//! device is unlocked.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler + ConnectionLifecycle (ws/)
//!     │
//!     ├── CommandDispatcher (service/) ──► RemoteClient ──► device cloud APIs
//!     ├── BroadcastRelay (relay/)
//!     │
//!     └── DeviceRegistry (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod relay;
pub mod server;
pub mod service;
pub mod ws;
