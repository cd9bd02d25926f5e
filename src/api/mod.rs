//! REST API layer: route handlers, DTOs, router composition, and the
//! OpenAPI document.
//!
//! All endpoints except `/health` are mounted under `/api/v1`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(
        handlers::device::list_devices,
        handlers::device::get_device,
        handlers::device::set_permission,
        handlers::control::control,
        handlers::control::authorize,
        handlers::relay::publish,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Devices", description = "Device catalog and permissions"),
        (name = "Control", description = "Permission-checked device actions"),
        (name = "Relay", description = "Broadcast to WebSocket subscribers"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
