//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::DeviceRegistry;
use crate::relay::BroadcastRelay;
use crate::service::CommandDispatcher;
use crate::ws::ConnectionSettings;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Device catalog and permission flags.
    pub registry: Arc<DeviceRegistry>,
    /// Subscriber set and fan-out.
    pub relay: Arc<BroadcastRelay>,
    /// Permission-checked device actions.
    pub dispatcher: Arc<CommandDispatcher>,
    /// Settings applied to every new WebSocket connection.
    pub connection: ConnectionSettings,
}
