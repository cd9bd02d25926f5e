//! Ordered device catalog holding the live permission flags.
//!
//! [`DeviceRegistry`] is the single source of truth for authorization
//! decisions. All devices live in one insertion-ordered map behind a
//! [`tokio::sync::RwLock`]; each entry additionally carries a per-device
//! gate that callers hold across check-then-act sequences.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::device::{DeviceDescriptor, DeviceSummary};
use super::DeviceId;
use crate::error::RelayError;

/// Exclusive hold on a device's gate. Released on drop.
pub type DeviceGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
struct DeviceSlot {
    descriptor: Arc<DeviceDescriptor>,
    permission: bool,
    gate: Arc<Mutex<()>>,
}

impl DeviceSlot {
    fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            permission: false,
            gate: Arc::new(Mutex::new(())),
        }
    }
}

/// A device descriptor paired with its permission at lookup time.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    /// Immutable descriptor.
    pub descriptor: Arc<DeviceDescriptor>,
    /// Permission flag observed when the entry was read.
    pub permission: bool,
}

/// Central store for all registered devices.
///
/// # Concurrency
///
/// - Permission reads and writes go through the map lock and are atomic
///   per call.
/// - [`DeviceRegistry::lock_device`] serializes multi-step operations on
///   one device without blocking readers of other devices or the map.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<IndexMap<DeviceId, DeviceSlot>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from descriptors, preserving their order. Every
    /// device starts locked.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] on a duplicate id, a
    /// descriptor without an `OFF` action, or a broadcast action whose
    /// message is scoped to another registered device.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = DeviceDescriptor>,
    ) -> Result<Self, RelayError> {
        let mut map = IndexMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if map.contains_key(&descriptor.id) {
                return Err(RelayError::InvalidRequest(format!(
                    "device {} registered twice",
                    descriptor.id
                )));
            }
            check_scopes(&map, &descriptor)?;
            map.insert(descriptor.id.clone(), DeviceSlot::new(descriptor));
        }
        Ok(Self {
            devices: RwLock::new(map),
        })
    }

    /// Appends a device. It starts locked.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] if the id is already taken,
    /// the descriptor has no `OFF` action, or a broadcast message would
    /// cross into another device's scope.
    pub async fn insert(&self, descriptor: DeviceDescriptor) -> Result<(), RelayError> {
        descriptor.validate()?;
        let mut map = self.devices.write().await;
        if map.contains_key(&descriptor.id) {
            return Err(RelayError::InvalidRequest(format!(
                "device {} already exists",
                descriptor.id
            )));
        }
        check_scopes(&map, &descriptor)?;
        map.insert(descriptor.id.clone(), DeviceSlot::new(descriptor));
        Ok(())
    }

    /// Returns the device and its current permission.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceNotFound`] if no device has this id.
    pub async fn get(&self, id: &str) -> Result<DeviceEntry, RelayError> {
        let map = self.devices.read().await;
        map.get(id)
            .map(|slot| DeviceEntry {
                descriptor: Arc::clone(&slot.descriptor),
                permission: slot.permission,
            })
            .ok_or_else(|| RelayError::DeviceNotFound(id.to_string()))
    }

    /// Returns summaries of all devices in registration order.
    pub async fn list(&self) -> Vec<DeviceSummary> {
        let map = self.devices.read().await;
        map.values()
            .map(|slot| DeviceSummary::new(&slot.descriptor, slot.permission))
            .collect()
    }

    /// Returns the permission flag, or `None` for an unknown id.
    pub async fn permission(&self, id: &str) -> Option<bool> {
        self.devices.read().await.get(id).map(|slot| slot.permission)
    }

    /// Sets the permission flag and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceNotFound`] if no device has this id.
    pub async fn set_permission(&self, id: &str, value: bool) -> Result<bool, RelayError> {
        let mut map = self.devices.write().await;
        let slot = map
            .get_mut(id)
            .ok_or_else(|| RelayError::DeviceNotFound(id.to_string()))?;
        Ok(std::mem::replace(&mut slot.permission, value))
    }

    /// Flips the permission flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceNotFound`] if no device has this id.
    pub async fn toggle_permission(&self, id: &str) -> Result<bool, RelayError> {
        let mut map = self.devices.write().await;
        let slot = map
            .get_mut(id)
            .ok_or_else(|| RelayError::DeviceNotFound(id.to_string()))?;
        slot.permission = !slot.permission;
        Ok(slot.permission)
    }

    /// Waits for exclusive hold of the device's gate.
    ///
    /// The map lock is released before waiting, so a long-held gate never
    /// blocks permission reads.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceNotFound`] if no device has this id.
    pub async fn lock_device(&self, id: &str) -> Result<DeviceGuard, RelayError> {
        let gate = {
            let map = self.devices.read().await;
            let slot = map
                .get(id)
                .ok_or_else(|| RelayError::DeviceNotFound(id.to_string()))?;
            Arc::clone(&slot.gate)
        };
        Ok(gate.lock_owned().await)
    }

    /// Returns the number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns `true` if no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

/// Device actions bypass the relay's permission check, so a broadcast
/// action may only speak in its own device's scope.
fn check_scopes(
    map: &IndexMap<DeviceId, DeviceSlot>,
    descriptor: &DeviceDescriptor,
) -> Result<(), RelayError> {
    if let Some(other) = descriptor.foreign_scopes().find(|prefix| map.contains_key(*prefix)) {
        return Err(RelayError::InvalidRequest(format!(
            "device {} broadcasts into the scope of device {other}",
            descriptor.id
        )));
    }
    if let Some(slot) = map.values().find(|slot| {
        slot.descriptor
            .foreign_scopes()
            .any(|prefix| prefix == descriptor.id.as_str())
    }) {
        return Err(RelayError::InvalidRequest(format!(
            "device {} broadcasts into the scope of device {}",
            slot.descriptor.id, descriptor.id
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::device::ActionKind;

    pub(crate) fn broadcast_device(id: &str) -> DeviceDescriptor {
        let Ok(device_id) = DeviceId::new(id) else {
            panic!("invalid id {id}");
        };
        let mut actions = IndexMap::new();
        for name in ["ON", "OFF"] {
            actions.insert(
                name.to_string(),
                ActionKind::LocalBroadcast {
                    message: format!("{id}_{name}"),
                },
            );
        }
        let Ok(descriptor) = DeviceDescriptor::new(device_id, id.to_uppercase(), "", "", actions)
        else {
            panic!("descriptor rejected");
        };
        descriptor
    }

    fn make_registry() -> DeviceRegistry {
        let Ok(registry) =
            DeviceRegistry::from_descriptors([broadcast_device("b"), broadcast_device("a")])
        else {
            panic!("registry rejected");
        };
        registry
    }

    #[tokio::test]
    async fn devices_start_locked() {
        let registry = make_registry();
        assert_eq!(registry.permission("a").await, Some(false));
        assert_eq!(registry.permission("b").await, Some(false));
        assert_eq!(registry.permission("c").await, None);
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let registry = make_registry();
        let ids: Vec<String> = registry
            .list()
            .await
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn duplicate_ids_rejected() {
        let result = DeviceRegistry::from_descriptors([broadcast_device("a"), broadcast_device("a")]);
        assert!(result.is_err());

        let registry = make_registry();
        assert!(registry.insert(broadcast_device("a")).await.is_err());
        assert!(registry.insert(broadcast_device("c")).await.is_ok());
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn toggle_twice_restores_value() {
        let registry = make_registry();
        let Ok(first) = registry.toggle_permission("a").await else {
            panic!("toggle failed");
        };
        let Ok(second) = registry.toggle_permission("a").await else {
            panic!("toggle failed");
        };
        assert!(first);
        assert!(!second);
        assert_eq!(registry.permission("a").await, Some(false));
    }

    #[tokio::test]
    async fn set_permission_returns_previous() {
        let registry = make_registry();
        assert!(matches!(registry.set_permission("a", true).await, Ok(false)));
        assert!(matches!(registry.set_permission("a", true).await, Ok(true)));
        assert!(matches!(
            registry.set_permission("zz", true).await,
            Err(RelayError::DeviceNotFound(id)) if id == "zz"
        ));
    }

    #[tokio::test]
    async fn get_reports_permission_snapshot() {
        let registry = make_registry();
        let _ = registry.set_permission("b", true).await;
        let Ok(entry) = registry.get("b").await else {
            panic!("device missing");
        };
        assert!(entry.permission);
        assert_eq!(entry.descriptor.id.as_str(), "b");
        assert!(registry.get("nope").await.is_err());
    }

    #[tokio::test]
    async fn concurrent_toggles_are_atomic() {
        let registry = Arc::new(make_registry());
        let mut handles = Vec::new();
        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let _ = registry.toggle_permission("a").await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        // An even number of flips lands back on the initial value.
        assert_eq!(registry.permission("a").await, Some(false));
    }

    #[tokio::test]
    async fn gate_is_exclusive_per_device() {
        let registry = make_registry();
        let Ok(guard) = registry.lock_device("a").await else {
            panic!("lock failed");
        };
        // Another device is independent.
        assert!(registry.lock_device("b").await.is_ok());
        // Reads are not blocked by a held gate.
        assert_eq!(registry.permission("a").await, Some(false));
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            registry.lock_device("a"),
        )
        .await;
        assert!(second.is_err());
        drop(guard);
        assert!(registry.lock_device("a").await.is_ok());
        assert!(registry.lock_device("missing").await.is_err());
    }

    fn device_broadcasting(id: &str, on_message: &str) -> DeviceDescriptor {
        let Ok(device_id) = DeviceId::new(id) else {
            panic!("invalid id {id}");
        };
        let mut actions = IndexMap::new();
        actions.insert(
            "ON".to_string(),
            ActionKind::LocalBroadcast {
                message: on_message.to_string(),
            },
        );
        actions.insert(
            "OFF".to_string(),
            ActionKind::LocalBroadcast {
                message: format!("{id}_OFF"),
            },
        );
        let Ok(descriptor) = DeviceDescriptor::new(device_id, id, "", "", actions) else {
            panic!("descriptor rejected");
        };
        descriptor
    }

    #[tokio::test]
    async fn cross_device_broadcast_rejected() {
        // Either declaration order.
        let forward = DeviceRegistry::from_descriptors([
            device_broadcasting("A", "B_ON"),
            broadcast_device("B"),
        ]);
        assert!(matches!(forward, Err(RelayError::InvalidRequest(_))));
        let backward = DeviceRegistry::from_descriptors([
            broadcast_device("B"),
            device_broadcasting("A", "B_ON"),
        ]);
        assert!(matches!(backward, Err(RelayError::InvalidRequest(_))));

        // Unregistered prefixes and unscoped text stay allowed.
        let Ok(registry) = DeviceRegistry::from_descriptors([
            device_broadcasting("A", "Z_ON"),
            device_broadcasting("C", "lights on"),
        ]) else {
            panic!("registry rejected");
        };
        assert!(registry.insert(broadcast_device("Z")).await.is_err());
        assert!(registry.insert(device_broadcasting("D", "C_ON")).await.is_err());
        assert!(registry.insert(broadcast_device("B")).await.is_ok());
        assert_eq!(registry.len().await, 3);
    }
}
