//! API Credentials

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Signature-based NVP API credentials.
///
/// One value is passed explicitly into every gateway call; there is no
/// implicit fallback to process configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub signature: String,
}

impl Credentials {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            signature: signature.into(),
        }
    }

    /// Build from three optional parts: all present, or all absent.
    ///
    /// Blank strings count as absent.
    pub fn from_parts(
        user: Option<String>,
        password: Option<String>,
        signature: Option<String>,
    ) -> Result<Option<Self>> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match (present(user), present(password), present(signature)) {
            (Some(user), Some(password), Some(signature)) => {
                Ok(Some(Self::new(user, password, signature)))
            }
            (None, None, None) => Ok(None),
            _ => Err(CheckoutError::Validation(
                "PayPal NVP credentials require user, password and signature".into(),
            )),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("signature", &"<redacted>")
            .finish()
    }
}
