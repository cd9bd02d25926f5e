//! Type-safe device identifier.
//!
//! [`DeviceId`] is a newtype around the short string key a device is
//! registered under (e.g. `"mbed"`). The id doubles as the prefix of
//! device-scoped relay messages (`"mbed_ON"`), so it must be non-empty and
//! must not contain the `_` separator.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Stable identifier of a registered device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a `DeviceId`, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] if `id` is empty, contains
    /// `_`, or contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, RelayError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RelayError::InvalidRequest(
                "device id must not be empty".to_string(),
            ));
        }
        if id.contains('_') || id.chars().any(char::is_whitespace) {
            return Err(RelayError::InvalidRequest(format!(
                "device id {id:?} must not contain '_' or whitespace"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
