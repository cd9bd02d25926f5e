//! Device listing, control, and permission DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::DeviceSummary;

/// Response body for `GET /devices`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    /// Devices in presentation order.
    pub devices: Vec<DeviceSummary>,
}

/// Query parameters for `/control`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ControlParams {
    /// Target device id.
    pub device: String,
    /// Action name, e.g. `ON` or `OFF`.
    pub action: String,
}

/// Query parameters for `/authorize`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// Device whose permission to flip. Omit to query nothing.
    #[serde(default)]
    pub device: Option<String>,
}

/// Response body for `/authorize`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    /// Device named in the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Permission after the call.
    pub permission: bool,
    /// `"success"`, `"Device not found: <id>"`, or empty.
    pub status: String,
}

/// Request body for `PUT /devices/{id}/permission`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionRequest {
    /// New permission value.
    pub permission: bool,
}

/// Response body for `PUT /devices/{id}/permission`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    /// Device id.
    pub device: String,
    /// Permission after the call.
    pub permission: bool,
}
