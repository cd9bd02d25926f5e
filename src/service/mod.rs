//! Service layer: device command orchestration.
//!
//! [`CommandDispatcher`] enforces [`crate::domain::DeviceRegistry`]
//! permission checks before running a device action, either a relay
//! broadcast or an outbound call through [`RemoteClient`].

pub mod command_dispatcher;
pub mod remote;

pub use command_dispatcher::{AuthorizeOutcome, CommandDispatcher, Done, Effect};
pub use remote::RemoteClient;
