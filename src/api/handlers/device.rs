//! Device presentation and permission handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::api::dto::{DeviceListResponse, PermissionRequest, PermissionResponse};
use crate::app_state::AppState;
use crate::domain::DeviceSummary;
use crate::error::{ErrorResponse, RelayError};

/// `GET /devices` — List devices in presentation order.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    tag = "Devices",
    summary = "List devices",
    description = "Returns every registered device with its live permission flag, in registration order.",
    responses(
        (status = 200, description = "Device list", body = DeviceListResponse),
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(DeviceListResponse {
        devices: state.registry.list().await,
    })
}

/// `GET /devices/{id}` — Get one device.
///
/// # Errors
///
/// Returns [`RelayError::DeviceNotFound`] for an unknown id.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{id}",
    tag = "Devices",
    summary = "Get device",
    params(
        ("id" = String, Path, description = "Device id"),
    ),
    responses(
        (status = 200, description = "Device found", body = DeviceSummary),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let entry = state.registry.get(&id).await?;
    Ok(Json(DeviceSummary::new(&entry.descriptor, entry.permission)))
}

/// `PUT /devices/{id}/permission` — Set a device's permission.
///
/// Revoking runs the device's `OFF` action before the response is sent.
///
/// # Errors
///
/// Returns [`RelayError::DeviceNotFound`] for an unknown id.
#[utoipa::path(
    put,
    path = "/api/v1/devices/{id}/permission",
    tag = "Devices",
    summary = "Set device permission",
    description = "Sets the permission flag. A transition to false switches the device off.",
    params(
        ("id" = String, Path, description = "Device id"),
    ),
    request_body = PermissionRequest,
    responses(
        (status = 200, description = "Permission set", body = PermissionResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn set_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PermissionRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let permission = state.dispatcher.set_permission(&id, req.permission).await?;
    Ok(Json(PermissionResponse {
        device: id,
        permission,
    }))
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{id}", get(get_device))
        .route("/devices/{id}/permission", put(set_permission))
}
