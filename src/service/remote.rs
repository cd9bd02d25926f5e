//! Outbound "set device mode" calls to device cloud APIs.

use std::time::Duration;

use secrecy::ExposeSecret;

use crate::domain::RemoteEndpoint;
use crate::error::RelayError;

/// HTTP client for [`RemoteEndpoint`] calls.
///
/// Every request is bounded by the timeout given at construction. Calls
/// are never retried.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// Builds a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the HTTP client cannot be
    /// initialised (e.g. no TLS backend).
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mcu-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Internal(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    /// Posts the endpoint's mode with its access token.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::OutboundCallFailed`] on a transport error,
    /// timeout, or non-2xx response.
    pub async fn set_mode(&self, endpoint: &RemoteEndpoint) -> Result<(), RelayError> {
        let form = [
            ("access_token", endpoint.token.expose_secret()),
            ("params", endpoint.mode.as_str()),
        ];
        self.http
            .post(&endpoint.url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!(url = %endpoint.url, mode = %endpoint.mode, "device mode set");
        Ok(())
    }
}
