//! Command dispatcher: permission-checked device actions.
//!
//! Every operation that reads a permission and then acts on it (`control`,
//! `authorize`, `set_permission`) holds the device's gate for the whole
//! sequence, so for any one device a control either completes before a
//! revoke or observes the revoke and is denied.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::RemoteClient;
use crate::domain::{ActionKind, DeviceDescriptor, DeviceId, DeviceRegistry, OFF_ACTION};
use crate::error::RelayError;
use crate::relay::{BroadcastRelay, Delivery};

/// Side effect produced by a device action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// The action broadcast a frame to the relay.
    Broadcast {
        /// Fan-out result.
        delivery: Delivery,
    },
    /// The action called the device's cloud API.
    Remote {
        /// `false` if the call failed and the failure was swallowed.
        succeeded: bool,
    },
}

/// Successful `control` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Done {
    /// Device the action ran on.
    #[schema(value_type = String)]
    pub device: DeviceId,
    /// Action name.
    pub action: String,
    /// What the action did.
    pub effect: Effect,
}

/// Result of an `authorize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// The permission flag was flipped.
    Toggled {
        /// Device whose flag changed.
        device: DeviceId,
        /// New flag value.
        permission: bool,
    },
    /// No device has the requested id.
    NotFound(String),
    /// No device was named; nothing changed.
    NoDevice,
}

impl AuthorizeOutcome {
    /// Permission after the call (`false` when nothing was toggled).
    #[must_use]
    pub const fn permission(&self) -> bool {
        match self {
            Self::Toggled { permission, .. } => *permission,
            Self::NotFound(_) | Self::NoDevice => false,
        }
    }

    /// Status text shown to the operator.
    #[must_use]
    pub fn status(&self) -> String {
        match self {
            Self::Toggled { .. } => "success".to_string(),
            Self::NotFound(id) => RelayError::DeviceNotFound(id.clone()).to_string(),
            Self::NoDevice => String::new(),
        }
    }
}

/// Orchestrates device actions and permission changes.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<DeviceRegistry>,
    relay: Arc<BroadcastRelay>,
    remote: RemoteClient,
    surface_outbound_failures: bool,
}

impl CommandDispatcher {
    /// Creates a dispatcher.
    ///
    /// With `surface_outbound_failures` unset, failed cloud calls are
    /// logged and reported as [`Effect::Remote`] with `succeeded: false`;
    /// when set, `control` returns [`RelayError::OutboundCallFailed`].
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        relay: Arc<BroadcastRelay>,
        remote: RemoteClient,
        surface_outbound_failures: bool,
    ) -> Self {
        Self {
            registry,
            relay,
            remote,
            surface_outbound_failures,
        }
    }

    /// Returns the device registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Returns the broadcast relay.
    #[must_use]
    pub fn relay(&self) -> &Arc<BroadcastRelay> {
        &self.relay
    }

    /// Runs `action` on `device` if the device is unlocked.
    ///
    /// # Errors
    ///
    /// - [`RelayError::DeviceNotFound`] for an unknown device.
    /// - [`RelayError::AccessDenied`] if the device is locked; the action
    ///   is not run.
    /// - [`RelayError::ActionNotFound`] for an unknown action.
    /// - [`RelayError::OutboundCallFailed`] only when outbound failures
    ///   are surfaced.
    pub async fn control(&self, device: &str, action: &str) -> Result<Done, RelayError> {
        let _gate = self.registry.lock_device(device).await?;
        let entry = self.registry.get(device).await?;
        if !entry.permission {
            tracing::warn!(device, action, "control denied: device locked");
            return Err(RelayError::AccessDenied {
                device: device.to_string(),
            });
        }
        let kind = entry
            .descriptor
            .action(action)
            .ok_or_else(|| RelayError::ActionNotFound {
                device: device.to_string(),
                action: action.to_string(),
            })?;

        let effect = self
            .run(&entry.descriptor, action, kind, self.surface_outbound_failures)
            .await?;
        tracing::info!(device, action, kind = kind.label(), "device action executed");
        Ok(Done {
            device: entry.descriptor.id.clone(),
            action: action.to_string(),
            effect,
        })
    }

    /// Flips a device's permission. Revoking runs the device's `OFF`
    /// action before returning.
    ///
    /// An absent or empty `device` is a no-op query.
    pub async fn authorize(&self, device: Option<&str>) -> AuthorizeOutcome {
        let Some(device) = device.filter(|d| !d.is_empty()) else {
            return AuthorizeOutcome::NoDevice;
        };
        let Ok(_gate) = self.registry.lock_device(device).await else {
            tracing::warn!(device, "authorize: device not found");
            return AuthorizeOutcome::NotFound(device.to_string());
        };
        let Ok(permission) = self.registry.toggle_permission(device).await else {
            return AuthorizeOutcome::NotFound(device.to_string());
        };
        tracing::info!(device, permission, "device permission toggled");

        if !permission {
            self.fail_safe(device).await;
        }
        let Ok(entry) = self.registry.get(device).await else {
            return AuthorizeOutcome::NotFound(device.to_string());
        };
        AuthorizeOutcome::Toggled {
            device: entry.descriptor.id.clone(),
            permission,
        }
    }

    /// Sets a device's permission. A `true` to `false` transition runs the
    /// device's `OFF` action before returning.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceNotFound`] for an unknown device.
    pub async fn set_permission(&self, device: &str, value: bool) -> Result<bool, RelayError> {
        let _gate = self.registry.lock_device(device).await?;
        let previous = self.registry.set_permission(device, value).await?;
        tracing::info!(device, previous, permission = value, "device permission set");
        if previous && !value {
            self.fail_safe(device).await;
        }
        Ok(value)
    }

    /// Runs the `OFF` action. Never fails; problems are logged.
    async fn fail_safe(&self, device: &str) {
        let Ok(entry) = self.registry.get(device).await else {
            return;
        };
        let Some(kind) = entry.descriptor.action(OFF_ACTION) else {
            tracing::error!(device, "device has no OFF action");
            return;
        };
        match self.run(&entry.descriptor, OFF_ACTION, kind, false).await {
            Ok(effect) => tracing::info!(device, ?effect, "fail-safe OFF executed"),
            Err(err) => tracing::warn!(device, error = %err, "fail-safe OFF failed"),
        }
    }

    async fn run(
        &self,
        descriptor: &DeviceDescriptor,
        action: &str,
        kind: &ActionKind,
        surface_failures: bool,
    ) -> Result<Effect, RelayError> {
        match kind {
            // Permission was checked under the gate, and the registry only
            // admits messages in the device's own scope, so skip the relay's
            // check; a revoke's OFF frame must not be self-denied.
            ActionKind::LocalBroadcast { message } => Ok(Effect::Broadcast {
                delivery: self.relay.fan_out(message).await,
            }),
            ActionKind::RemoteCall(endpoint) => match self.remote.set_mode(endpoint).await {
                Ok(()) => Ok(Effect::Remote { succeeded: true }),
                Err(err) if surface_failures => Err(err),
                Err(err) => {
                    tracing::warn!(
                        device = %descriptor.id,
                        action,
                        error = %err,
                        "outbound call failed"
                    );
                    Ok(Effect::Remote { succeeded: false })
                }
            },
        }
    }
}
