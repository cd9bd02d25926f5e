//! Relay message classification.
//!
//! A relay message is free-form text. When it has the shape
//! `"<prefix>_<rest>"` the prefix is a candidate device id; if that id is
//! registered the message is device-scoped and gated by the device's
//! permission flag.

/// Returns the candidate device id of a message, if it has one.
///
/// Splits at the first `_` only, so `"mbed_ON_now"` yields `"mbed"`.
/// An empty prefix (`"_x"`) is not a candidate.
#[must_use]
pub fn scope_prefix(message: &str) -> Option<&str> {
    match message.split_once('_') {
        Some((prefix, _)) if !prefix.is_empty() => Some(prefix),
        _ => None,
    }
}
