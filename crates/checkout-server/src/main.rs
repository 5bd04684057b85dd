//! NVP Checkout HTTP Server
//!
//! Axum-based server exposing the Express Checkout flow to the browser.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nvp_checkout::{
    CheckoutOptions, ExpressCheckout, MemorySessionStore, NvpClient, NvpConfig, SessionStore,
    spawn_sweeper,
};

use crate::handlers::{
    cancel_checkout, checkout_details, checkout_return, complete_checkout, create_checkout,
    debug_config, health_check, test_credentials, transaction_activity,
};
use crate::state::AppState;

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Express Checkout
        .route("/api/nvp/create", post(create_checkout))
        .route("/api/nvp/return", get(checkout_return))
        .route("/api/nvp/complete", post(complete_checkout))
        .route("/api/nvp/details", get(checkout_details))
        .route("/api/nvp/cancel", get(cancel_checkout))

        // Account tools
        .route("/api/nvp/debug", get(debug_config))
        .route("/api/nvp/test", post(test_credentials))
        .route("/api/nvp/activity", get(transaction_activity))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NvpConfig::from_env()?;

    tracing::info!("PayPal NVP configured for {} environment", config.environment);
    tracing::info!("  NVP Endpoint: {}", config.endpoint());
    tracing::info!("  PayPal Host:  {}", config.environment.web_host());

    if config.has_credentials() {
        tracing::info!("✓ Default NVP credentials configured");
    } else {
        tracing::warn!("⚠ No default NVP credentials - callers must supply their own");
        tracing::warn!("  Set PAYPAL_USER, PAYPAL_PWD and PAYPAL_SIGNATURE in .env");
    }

    // Gateway and session store
    let gateway = Arc::new(NvpClient::from_config(&config)?);
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

    let checkout = Arc::new(ExpressCheckout::new(
        gateway,
        store.clone(),
        CheckoutOptions::from_config(&config),
    ));

    let sweeper = spawn_sweeper(store, config.sweep_interval, config.session_ttl);

    // Build application state
    let state = AppState {
        checkout,
        config: Arc::new(config),
    };

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 nvp-checkout server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  POST /api/nvp/create    - Create Express Checkout");
    tracing::info!("  GET  /api/nvp/return    - PayPal return callback");
    tracing::info!("  POST /api/nvp/complete  - Complete payment");
    tracing::info!("  GET  /api/nvp/details   - Checkout details");
    tracing::info!("  GET  /api/nvp/cancel    - PayPal cancel callback");
    tracing::info!("  GET  /api/nvp/debug     - Configuration status");
    tracing::info!("  POST /api/nvp/test      - Test NVP credentials");
    tracing::info!("  GET  /api/nvp/activity  - Transaction search");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
