//! Domain layer: device identity, descriptors, the device registry, and
//! relay message classification.
//!
//! Devices are registered once at startup. Only their permission flags
//! change afterwards, and only through [`DeviceRegistry`].

pub mod device;
pub mod device_id;
pub mod device_registry;
pub mod message;

pub use device::{ActionKind, DeviceDescriptor, DeviceSummary, OFF_ACTION, RemoteEndpoint};
pub use device_id::DeviceId;
pub use device_registry::{DeviceEntry, DeviceGuard, DeviceRegistry};
