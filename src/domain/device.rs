//! Device descriptors and the actions they expose.

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::DeviceId;
use super::message::scope_prefix;
use crate::error::RelayError;

/// Name of the action run whenever a device's permission is revoked.
pub const OFF_ACTION: &str = "OFF";

/// Outbound "set device mode" endpoint of a cloud-connected device.
///
/// Invoked as an HTTP `POST` to `url` with the form fields
/// `access_token` and `params=<mode>`.
#[derive(Debug, Deserialize)]
pub struct RemoteEndpoint {
    /// Device-specific cloud endpoint.
    pub url: String,
    /// Access token sent with every call. Never logged.
    pub token: SecretString,
    /// Mode string placed in the `params` field.
    pub mode: String,
}

/// What invoking a device action does.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Broadcast `message` verbatim to every relay subscriber.
    LocalBroadcast {
        /// Frame text the device firmware reacts to (e.g. `"mbed_ON"`).
        message: String,
    },
    /// Call the device's cloud API.
    RemoteCall(RemoteEndpoint),
}

impl ActionKind {
    /// Short label used in logs and presentation output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LocalBroadcast { .. } => "local_broadcast",
            Self::RemoteCall(_) => "remote_call",
        }
    }
}

/// Immutable description of a controllable device.
///
/// The live permission flag is not part of the descriptor; it is owned by
/// [`super::DeviceRegistry`] so that nothing else can flip it.
#[derive(Debug, Deserialize)]
pub struct DeviceDescriptor {
    /// Registry key and message prefix.
    pub id: DeviceId,
    /// Human-readable name.
    pub display_name: String,
    /// Name of the firmware tooling the device is built with.
    #[serde(default)]
    pub tooling_name: String,
    /// Link to the firmware tooling.
    #[serde(default)]
    pub tooling_url: String,
    actions: IndexMap<String, ActionKind>,
}

impl DeviceDescriptor {
    /// Creates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] if the descriptor has no
    /// [`OFF_ACTION`].
    pub fn new(
        id: DeviceId,
        display_name: impl Into<String>,
        tooling_name: impl Into<String>,
        tooling_url: impl Into<String>,
        actions: IndexMap<String, ActionKind>,
    ) -> Result<Self, RelayError> {
        let descriptor = Self {
            id,
            display_name: display_name.into(),
            tooling_name: tooling_name.into(),
            tooling_url: tooling_url.into(),
            actions,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Checks that the fail-safe [`OFF_ACTION`] is present.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when it is missing.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.actions.contains_key(OFF_ACTION) {
            Ok(())
        } else {
            Err(RelayError::InvalidRequest(format!(
                "device {} has no {OFF_ACTION} action",
                self.id
            )))
        }
    }

    /// Looks up an action by name (case-sensitive).
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionKind> {
        self.actions.get(name)
    }

    /// Action names in declaration order.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Scope prefixes of broadcast messages that name a device id other
    /// than this one.
    pub fn foreign_scopes(&self) -> impl Iterator<Item = &str> {
        self.actions
            .values()
            .filter_map(|kind| match kind {
                ActionKind::LocalBroadcast { message } => scope_prefix(message),
                ActionKind::RemoteCall(_) => None,
            })
            .filter(move |prefix| *prefix != self.id.as_str())
    }
}

/// Presentation view of a device together with its live permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeviceSummary {
    /// Device identifier.
    #[schema(value_type = String)]
    pub id: DeviceId,
    /// Human-readable name.
    pub display_name: String,
    /// Firmware tooling name.
    pub tooling_name: String,
    /// Firmware tooling link.
    pub tooling_url: String,
    /// Whether control and device-scoped messages are currently allowed.
    pub permission: bool,
    /// Action names in declaration order.
    pub actions: Vec<String>,
}

impl DeviceSummary {
    /// Builds a summary from a descriptor and its current permission.
    #[must_use]
    pub fn new(descriptor: &DeviceDescriptor, permission: bool) -> Self {
        Self {
            id: descriptor.id.clone(),
            display_name: descriptor.display_name.clone(),
            tooling_name: descriptor.tooling_name.clone(),
            tooling_url: descriptor.tooling_url.clone(),
            permission,
            actions: descriptor.action_names().map(str::to_string).collect(),
        }
    }
}
