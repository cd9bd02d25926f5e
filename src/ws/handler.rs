//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket and subscribe it to
/// the relay.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let relay = Arc::clone(&state.relay);
    let settings = state.connection;

    ws.on_failed_upgrade(|err| tracing::warn!(error = %err, "ws upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, relay, settings))
}
