//! Relay publish DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::relay::Delivery;

/// Query parameters for `/publish`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublishParams {
    /// Text to broadcast verbatim.
    pub message: String,
}

/// Response body for `/publish`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    /// The message as broadcast.
    pub message: String,
    /// Fan-out result.
    pub delivery: Delivery,
}
