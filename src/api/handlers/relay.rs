//! Relay publish handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{PublishParams, PublishResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};

/// `POST /publish` — Broadcast a message to every subscriber.
///
/// # Errors
///
/// Returns [`RelayError::AccessDenied`] if the message is scoped to a
/// locked device.
#[utoipa::path(
    post,
    path = "/api/v1/publish",
    tag = "Relay",
    summary = "Publish a message",
    description = "Broadcasts the message verbatim to all WebSocket subscribers. A `<device>_` prefix naming a locked device is denied.",
    params(PublishParams),
    responses(
        (status = 200, description = "Message broadcast", body = PublishResponse),
        (status = 403, description = "Device locked", body = ErrorResponse),
    )
)]
pub async fn publish(
    State(state): State<AppState>,
    Query(params): Query<PublishParams>,
) -> Result<impl IntoResponse, RelayError> {
    let delivery = state.relay.publish(&params.message).await?;
    Ok(Json(PublishResponse {
        message: params.message,
        delivery,
    }))
}

/// Relay routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/publish", get(publish).post(publish))
}
