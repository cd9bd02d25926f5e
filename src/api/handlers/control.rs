//! Control and authorize handlers.
//!
//! Both accept query parameters over `GET` and `POST`, so plain HTML forms
//! can drive them.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{AuthorizeParams, AuthorizeResponse, ControlParams};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};
use crate::service::{AuthorizeOutcome, Done};

/// `POST /control` — Run a device action.
///
/// # Errors
///
/// Returns [`RelayError`] for an unknown device or action, a locked
/// device, or (when configured) a failed outbound call.
#[utoipa::path(
    post,
    path = "/api/v1/control",
    tag = "Control",
    summary = "Run a device action",
    description = "Runs the named action if the device is unlocked. Locked devices are denied without side effects.",
    params(ControlParams),
    responses(
        (status = 200, description = "Action executed", body = Done),
        (status = 403, description = "Device locked", body = ErrorResponse),
        (status = 404, description = "Device or action not found", body = ErrorResponse),
        (status = 502, description = "Outbound device call failed", body = ErrorResponse),
    )
)]
pub async fn control(
    State(state): State<AppState>,
    Query(params): Query<ControlParams>,
) -> Result<impl IntoResponse, RelayError> {
    let done = state
        .dispatcher
        .control(&params.device, &params.action)
        .await?;
    Ok(Json(done))
}

/// `POST /authorize` — Flip a device's permission.
#[utoipa::path(
    post,
    path = "/api/v1/authorize",
    tag = "Control",
    summary = "Toggle device permission",
    description = "Flips the permission flag. Locking a device switches it off. Without a device, nothing changes.",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Permission toggled, or no device given", body = AuthorizeResponse),
        (status = 404, description = "Device not found", body = AuthorizeResponse),
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> impl IntoResponse {
    let outcome = state.dispatcher.authorize(params.device.as_deref()).await;
    let status = match outcome {
        AuthorizeOutcome::NotFound(_) => StatusCode::NOT_FOUND,
        AuthorizeOutcome::Toggled { .. } | AuthorizeOutcome::NoDevice => StatusCode::OK,
    };
    (
        status,
        Json(AuthorizeResponse {
            device: params.device.filter(|d| !d.is_empty()),
            permission: outcome.permission(),
            status: outcome.status(),
        }),
    )
}

/// Control routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/control", get(control).post(control))
        .route("/authorize", get(authorize).post(authorize))
}
