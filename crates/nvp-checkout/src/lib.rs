//! # nvp-checkout
//!
//! PayPal Express Checkout over the legacy name-value-pair (NVP) API.
//!
//! ## Flow
//!
//! The provider redirects the browser between steps, so the three legs
//! share no context except the token. The pending order is remembered under
//! that token in a [`SessionStore`].
//!
//! ```text
//! ┌─────────────┐  SetExpressCheckout  ┌─────────────────┐
//! │  initiate   │─────────────────────▶│  PayPal hosted  │
//! │ (store ord) │    redirect_url      │  approval page  │
//! └─────────────┘                      └────────┬────────┘
//!                                               │ token + PayerID
//! ┌─────────────┐ DoExpressCheckoutPayment      ▼
//! │  Receipt    │◀──────────────────────── finalize (stored amount)
//! └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nvp_checkout::{CheckoutOptions, ExpressCheckout, MemorySessionStore, NvpClient, NvpConfig};
//!
//! let config = NvpConfig::from_env()?;
//! let checkout = ExpressCheckout::new(
//!     Arc::new(NvpClient::from_config(&config)?),
//!     Arc::new(MemorySessionStore::new()),
//!     CheckoutOptions::from_config(&config),
//! );
//!
//! let credentials = config.credentials.clone().expect("credentials");
//! let session = checkout.initiate("19.99", "USD", &credentials).await?;
//! // Redirect user to: session.redirect_url
//!
//! // ...later, on the return callback:
//! let receipt = checkout.finalize(&session.token, "PAYERID123").await?;
//! ```

pub mod account;
mod checkout;
mod config;
mod credentials;
mod error;
pub mod gateway;
pub mod nvp;
mod session;

pub use checkout::{
    CheckoutDetails, CheckoutOptions, CheckoutSession, DO_EXPRESS_CHECKOUT_PAYMENT,
    ExpressCheckout, GET_EXPRESS_CHECKOUT_DETAILS, Receipt, SET_EXPRESS_CHECKOUT,
};
pub use config::{Environment, NvpConfig};
pub use credentials::Credentials;
pub use error::{CheckoutError, Result};
pub use gateway::{MockGateway, MockReply, NvpClient, NvpGateway};
pub use nvp::{NvpFields, NvpResponse};
pub use session::{MemorySessionStore, PendingOrder, SessionStore, spawn_sweeper};
