//! Application assembly shared by the binary and the integration tests.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::RelayConfig;
use crate::domain::{DeviceDescriptor, DeviceRegistry};
use crate::relay::{BroadcastRelay, RelayOptions};
use crate::service::{CommandDispatcher, RemoteClient};
use crate::ws::ConnectionSettings;
use crate::ws::handler::ws_handler;

/// Wires registry, relay, and dispatcher from a device catalog.
///
/// # Errors
///
/// Returns an error if the catalog is invalid or the outbound HTTP client
/// cannot be built.
pub fn build_state(
    devices: Vec<DeviceDescriptor>,
    relay_options: RelayOptions,
    connection: ConnectionSettings,
    remote: RemoteClient,
    surface_outbound_failures: bool,
) -> anyhow::Result<AppState> {
    let registry = Arc::new(DeviceRegistry::from_descriptors(devices).context("device catalog")?);
    let relay = Arc::new(BroadcastRelay::new(Arc::clone(&registry), relay_options));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&relay),
        remote,
        surface_outbound_failures,
    ));
    Ok(AppState {
        registry,
        relay,
        dispatcher,
        connection,
    })
}

/// Builds application state from configuration.
///
/// # Errors
///
/// Returns an error if the device catalog cannot be loaded or the
/// outbound HTTP client cannot be built.
pub fn state_from_config(config: &RelayConfig) -> anyhow::Result<AppState> {
    let devices = config.load_devices()?;
    let remote = RemoteClient::new(config.outbound_timeout()).context("outbound client")?;
    build_state(
        devices,
        config.relay_options(),
        config.connection_settings(),
        remote,
        config.outbound_failures_visible,
    )
}

/// Builds the router: REST API, `/ws`, tracing and CORS layers, and the
/// Swagger UI when enabled.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
