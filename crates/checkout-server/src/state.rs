//! Application State

use std::sync::Arc;

use nvp_checkout::{ExpressCheckout, NvpConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Express Checkout orchestrator (gateway + session store)
    pub checkout: Arc<ExpressCheckout>,

    /// NVP configuration, including the default credentials
    pub config: Arc<NvpConfig>,
}
