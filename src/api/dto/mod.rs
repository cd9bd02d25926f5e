//! Data Transfer Objects for REST request/response serialization.

pub mod device_dto;
pub mod relay_dto;

pub use device_dto::*;
pub use relay_dto::*;
