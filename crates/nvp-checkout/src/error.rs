//! Checkout Error Types

use thiserror::Error;

use crate::nvp::NvpResponse;

/// Result type alias
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout-related errors
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Bad input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection failure or timeout talking to the provider.
    ///
    /// The outcome of the call is unknown: the provider may or may not have
    /// acted on it.
    #[error("Transport error during {method}: {message}")]
    Transport {
        method: String,
        message: String,
        timeout: bool,
    },

    /// Provider answered but did not acknowledge success
    #[error("PayPal {method} failed: {}", .response.error_message())]
    Gateway {
        method: String,
        response: NvpResponse,
    },

    /// Token is not pending (expired, already finalized, or never issued)
    #[error("Unknown or expired checkout session")]
    UnknownSession,

    /// Provider redirect arrived without the expected parameters
    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CheckoutError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this error is a timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }

    /// Raw provider payload, when the provider rejected the call
    pub const fn provider_response(&self) -> Option<&NvpResponse> {
        match self {
            Self::Gateway { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::MalformedCallback(msg) => msg.clone(),
            Self::Transport { timeout: true, .. } => {
                "PayPal did not respond in time. Please check your order status before retrying."
                    .into()
            }
            Self::Transport { .. } => "PayPal is currently unreachable. Please try again.".into(),
            Self::Gateway { response, .. } => response.error_message().to_string(),
            Self::UnknownSession => {
                "This checkout session has expired or was already completed.".into()
            }
            Self::Config(_) => "Service configuration error.".into(),
            Self::Storage(_) => "An error occurred processing your request.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        let timeout = CheckoutError::Transport {
            method: "DoExpressCheckoutPayment".into(),
            message: "operation timed out".into(),
            timeout: true,
        };
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let rejected = CheckoutError::Gateway {
            method: "DoExpressCheckoutPayment".into(),
            response: NvpResponse::parse("ACK=Failure&L_LONGMESSAGE0=Invalid"),
        };
        assert!(!rejected.is_retryable());
        assert!(!CheckoutError::UnknownSession.is_retryable());
    }

    #[test]
    fn test_gateway_display_uses_long_message() {
        let err = CheckoutError::Gateway {
            method: "SetExpressCheckout".into(),
            response: NvpResponse::parse("ACK=Failure&L_LONGMESSAGE0=Invalid%20amount"),
        };
        assert_eq!(err.to_string(), "PayPal SetExpressCheckout failed: Invalid amount");
        assert_eq!(err.user_message(), "Invalid amount");
        assert!(err.provider_response().is_some());
    }
}
