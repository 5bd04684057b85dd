//! Remote Payment Gateway
//!
//! The [`NvpGateway`] trait is the seam between checkout logic and the
//! provider. [`NvpClient`] talks to the real NVP endpoint over HTTP;
//! [`MockGateway`] replays scripted replies for tests and demos.

mod mock;

pub use mock::{MockGateway, MockReply, RecordedCall};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::NvpConfig;
use crate::credentials::Credentials;
use crate::error::{CheckoutError, Result};
use crate::nvp::{self, NvpFields, NvpResponse};

/// Gateway client trait (Strategy pattern)
#[async_trait]
pub trait NvpGateway: Send + Sync {
    /// Call an NVP `method` with the given fields and credentials.
    ///
    /// Returns the decoded reply only when `ACK` starts with "success";
    /// any other reply is a [`CheckoutError::Gateway`].
    async fn call(
        &self,
        method: &str,
        fields: NvpFields,
        credentials: &Credentials,
    ) -> Result<NvpResponse>;

    /// Gateway name
    fn name(&self) -> &str;
}

/// Turn a decoded reply into a result based on its `ACK`
pub(crate) fn check_ack(method: &str, response: NvpResponse) -> Result<NvpResponse> {
    if response.is_success() {
        tracing::debug!(
            method,
            ack = response.ack(),
            correlation_id = ?response.correlation_id(),
            "PayPal NVP call succeeded"
        );
        Ok(response)
    } else {
        tracing::warn!(
            method,
            ack = response.ack(),
            correlation_id = ?response.correlation_id(),
            error = response.error_message(),
            "PayPal NVP call rejected"
        );
        Err(CheckoutError::Gateway {
            method: method.to_string(),
            response,
        })
    }
}

/// HTTP client for the NVP endpoint
pub struct NvpClient {
    http: reqwest::Client,
    endpoint: String,
    version: String,
}

impl NvpClient {
    /// Create a client for a specific endpoint
    pub fn new(
        endpoint: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            version: version.into(),
        })
    }

    /// Create from configuration
    pub fn from_config(config: &NvpConfig) -> Result<Self> {
        Self::new(config.endpoint(), config.version.clone(), config.timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Form body: authentication fields first, then the call fields
    fn build_body(&self, method: &str, fields: &NvpFields, credentials: &Credentials) -> String {
        let auth = [
            ("METHOD", method),
            ("VERSION", self.version.as_str()),
            ("USER", credentials.user.as_str()),
            ("PWD", credentials.password.as_str()),
            ("SIGNATURE", credentials.signature.as_str()),
        ];
        nvp::encode(auth.into_iter().chain(fields.iter()))
    }

    fn transport_error(method: &str, err: &reqwest::Error) -> CheckoutError {
        CheckoutError::Transport {
            method: method.to_string(),
            message: err.to_string(),
            timeout: err.is_timeout(),
        }
    }
}

#[async_trait]
impl NvpGateway for NvpClient {
    async fn call(
        &self,
        method: &str,
        fields: NvpFields,
        credentials: &Credentials,
    ) -> Result<NvpResponse> {
        tracing::info!(method, user = %credentials.user, version = %self.version, "PayPal NVP request");

        let body = self.build_body(method, &fields, credentials);

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(method, error = %e, timeout = e.is_timeout(), "PayPal NVP request failed");
                Self::transport_error(method, &e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::transport_error(method, &e))?;
        let parsed = NvpResponse::parse(&text);

        // Error statuses still carry an NVP body most of the time
        if !status.is_success() && parsed.get("ACK").is_none() {
            tracing::error!(method, %status, "PayPal NVP endpoint returned a non-NVP error");
            return Err(CheckoutError::Transport {
                method: method.to_string(),
                message: format!("HTTP {status}"),
                timeout: false,
            });
        }

        check_ack(method, parsed)
    }

    fn name(&self) -> &str {
        "PayPal NVP"
    }
}
