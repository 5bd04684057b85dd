//! NVP Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::{CheckoutError, Result};

/// Target PayPal environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Live,
}

impl Environment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Live => "live",
        }
    }

    /// NVP API endpoint
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-3t.sandbox.paypal.com/nvp",
            Self::Live => "https://api-3t.paypal.com/nvp",
        }
    }

    /// Host serving the hosted checkout pages
    pub const fn web_host(self) -> &'static str {
        match self {
            Self::Sandbox => "www.sandbox.paypal.com",
            Self::Live => "www.paypal.com",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "live" => Ok(Self::Live),
            other => Err(CheckoutError::Config(format!(
                "PAYPAL_ENV must be 'sandbox' or 'live', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NVP client and checkout configuration
#[derive(Clone, Debug)]
pub struct NvpConfig {
    pub environment: Environment,

    /// API version sent as `VERSION`
    pub version: String,

    /// Default merchant credentials, if configured
    pub credentials: Option<Credentials>,

    /// Base for the return/cancel callback URLs
    pub base_url: String,

    /// Outbound request timeout
    pub timeout: Duration,

    /// How long a pending session may wait for its return callback
    pub session_ttl: Duration,

    /// How often expired sessions are swept
    pub sweep_interval: Duration,

    /// `BRANDNAME` shown on the hosted page
    pub brand_name: String,
}

impl Default for NvpConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            version: "204.0".into(),
            credentials: None,
            base_url: "http://localhost:3001".into(),
            timeout: Duration::from_secs(20),
            session_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            brand_name: "My Store".into(),
        }
    }
}

impl NvpConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let environment = lookup("PAYPAL_ENV")
            .map(|v| v.parse::<Environment>())
            .transpose()?
            .unwrap_or(defaults.environment);

        let credentials = Credentials::from_parts(
            lookup("PAYPAL_USER"),
            lookup("PAYPAL_PWD"),
            lookup("PAYPAL_SIGNATURE"),
        )
        .map_err(|_| {
            CheckoutError::Config(
                "PAYPAL_USER, PAYPAL_PWD and PAYPAL_SIGNATURE must be set together".into(),
            )
        })?;

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            lookup(key).map_or(Ok(default), |v| {
                v.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| CheckoutError::Config(format!("{key} must be a whole number of seconds")))
            })
        };

        Ok(Self {
            environment,
            version: lookup("PAYPAL_NVP_VERSION").unwrap_or(defaults.version),
            credentials,
            base_url: lookup("BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: secs("PAYPAL_NVP_TIMEOUT_SECS", defaults.timeout)?,
            session_ttl: secs("NVP_SESSION_TTL_SECS", defaults.session_ttl)?,
            sweep_interval: secs("NVP_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            brand_name: lookup("NVP_BRAND_NAME").unwrap_or(defaults.brand_name),
        })
    }

    pub fn endpoint(&self) -> &'static str {
        self.environment.endpoint()
    }

    pub fn return_url(&self) -> String {
        format!("{}/api/nvp/return", self.base_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/api/nvp/cancel", self.base_url)
    }

    pub const fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}
