//! HTTP Handlers

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
};
use serde::{Deserialize, Serialize};

use nvp_checkout::{
    CheckoutDetails, CheckoutError, CheckoutSession, Credentials, NvpResponse, Receipt,
    SET_EXPRESS_CHECKOUT,
    account::{self, GET_BALANCE, TransactionQuery, TransactionRecord},
    nvp::encode_component,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<NvpResponse>,
}

/// `{"success": true, ...payload}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Success<T> {
    const fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugResponse {
    pub environment: &'static str,
    pub endpoint_host: String,
    pub web_host: &'static str,
    pub version: String,
    pub base_url: String,
    pub has_credentials: bool,
    pub pending_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct TestCredentialsResponse {
    pub success: bool,
    pub status: &'static str,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub ack: String,
    pub count: usize,
    pub transactions: Vec<TransactionRecord>,
}

// ============================================================================
// Request Types
// ============================================================================

/// Amount as sent by the browser: `"19.99"` or `19.99`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub amount: Option<AmountInput>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub paypal_user: Option<String>,
    #[serde(default)]
    pub paypal_pwd: Option<String>,
    #[serde(default)]
    pub paypal_signature: Option<String>,
}

fn default_currency() -> String {
    "USD".into()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    pub paypal_user: Option<String>,
    #[serde(default)]
    pub paypal_pwd: Option<String>,
    #[serde(default)]
    pub paypal_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub token: Option<String>,
    #[serde(rename = "PayerID", alias = "payerId")]
    pub payer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub payer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// ============================================================================
// Error Mapping
// ============================================================================

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_and_code(e: &CheckoutError) -> (StatusCode, &'static str) {
    match e {
        CheckoutError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CheckoutError::MalformedCallback(_) => (StatusCode::BAD_REQUEST, "MALFORMED_CALLBACK"),
        CheckoutError::UnknownSession => (StatusCode::NOT_FOUND, "UNKNOWN_SESSION"),
        CheckoutError::Gateway { method, .. }
            if method == SET_EXPRESS_CHECKOUT || method == GET_BALANCE =>
        {
            (StatusCode::BAD_REQUEST, "GATEWAY_ERROR")
        }
        CheckoutError::Gateway { .. } => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
        CheckoutError::Transport { timeout: true, .. } => {
            (StatusCode::REQUEST_TIMEOUT, "GATEWAY_TIMEOUT")
        }
        CheckoutError::Transport { .. } => (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNAVAILABLE"),
        CheckoutError::Config(_) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
        CheckoutError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

/// Message shown to the caller; config messages name the missing setting
fn public_message(e: &CheckoutError) -> String {
    match e {
        CheckoutError::Config(msg) => msg.clone(),
        other => other.user_message(),
    }
}

fn api_error(e: &CheckoutError) -> ApiError {
    let (status, code) = status_and_code(e);
    if status.is_server_error() {
        tracing::error!(code, "{}", e);
    } else {
        tracing::warn!(code, "{}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: public_message(e),
            code: code.into(),
            provider_error: e.provider_response().cloned(),
        }),
    )
}

/// Caller-supplied credentials win; otherwise the configured default
fn resolve_credentials(
    state: &AppState,
    user: Option<String>,
    password: Option<String>,
    signature: Option<String>,
) -> Result<Credentials, CheckoutError> {
    Credentials::from_parts(user, password, signature)?
        .or_else(|| state.config.credentials.clone())
        .ok_or_else(|| CheckoutError::Config("PayPal NVP credentials are required".into()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
    })
}

/// Start an Express Checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequest>,
) -> Result<Json<Success<CheckoutSession>>, ApiError> {
    let credentials = resolve_credentials(
        &state,
        payload.paypal_user,
        payload.paypal_pwd,
        payload.paypal_signature,
    )
    .map_err(|e| api_error(&e))?;

    let amount = payload
        .amount
        .map(AmountInput::into_string)
        .unwrap_or_default();

    let session = state
        .checkout
        .initiate(&amount, &payload.currency, &credentials)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(Success::new(session)))
}

/// Provider return redirect: capture, then send the browser to a result view
pub async fn checkout_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Redirect {
    let result = state
        .checkout
        .finalize_callback(query.token.as_deref(), query.payer_id.as_deref())
        .await;

    match result {
        Ok(receipt) => Redirect::to(&format!(
            "/nvp-success?transactionId={}&amount={}&currency={}",
            encode_component(&receipt.transaction_id),
            encode_component(&receipt.amount),
            encode_component(&receipt.currency),
        )),
        Err(e) => {
            tracing::warn!(token = ?query.token, error = %e, "Return callback failed");
            Redirect::to(&format!(
                "/nvp-error?error={}",
                encode_component(&public_message(&e))
            ))
        }
    }
}

/// Capture a checkout from a JSON client
pub async fn complete_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<Success<Receipt>>, ApiError> {
    let receipt = state
        .checkout
        .finalize_callback(payload.token.as_deref(), payload.payer_id.as_deref())
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(Success::new(receipt)))
}

/// Provider view of a pending checkout
pub async fn checkout_details(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<CheckoutDetails>, ApiError> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| api_error(&CheckoutError::Validation("token is required".into())))?;

    let details = state
        .checkout
        .details(&token)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(details))
}

/// Provider cancel redirect
pub async fn cancel_checkout(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Redirect {
    if let Err(e) = state.checkout.cancel(query.token.as_deref()) {
        tracing::error!(error = %e, "Failed to drop cancelled session");
    }
    Redirect::to("/nvp-cancelled")
}

/// Configuration status, without secrets
pub async fn debug_config(State(state): State<AppState>) -> Result<Json<DebugResponse>, ApiError> {
    let config = &state.config;
    let pending_sessions = state.checkout.pending_count().map_err(|e| api_error(&e))?;

    let endpoint_host = config
        .endpoint()
        .trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(Json(DebugResponse {
        environment: config.environment.as_str(),
        endpoint_host,
        web_host: config.environment.web_host(),
        version: config.version.clone(),
        base_url: config.base_url.clone(),
        has_credentials: config.has_credentials(),
        pending_sessions,
    }))
}

/// Verify credentials with a balance lookup
pub async fn test_credentials(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> (StatusCode, Json<TestCredentialsResponse>) {
    let result = match resolve_credentials(
        &state,
        payload.paypal_user,
        payload.paypal_pwd,
        payload.paypal_signature,
    ) {
        Ok(credentials) => {
            account::check_credentials(&**state.checkout.gateway(), &credentials).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(balance) => (
            StatusCode::OK,
            Json(TestCredentialsResponse {
                success: true,
                status: "LIVE",
                message: "PayPal NVP credentials are valid".into(),
                details: serde_json::json!({
                    "balances": balance.balances,
                    "ack": balance.response.ack(),
                    "correlationId": balance.response.correlation_id(),
                }),
            }),
        ),
        Err(e) => {
            let (status, label) = match &e {
                CheckoutError::Transport { timeout: true, .. } => {
                    (StatusCode::REQUEST_TIMEOUT, "TIMEOUT")
                }
                CheckoutError::Transport { .. } => (StatusCode::SERVICE_UNAVAILABLE, "NETWORK_ERROR"),
                _ => (StatusCode::BAD_REQUEST, "ERROR"),
            };
            tracing::warn!(status = label, error = %e, "Credential check failed");

            let details = e
                .provider_response()
                .and_then(|r| serde_json::to_value(r).ok())
                .unwrap_or(serde_json::Value::Null);

            (
                status,
                Json(TestCredentialsResponse {
                    success: false,
                    status: label,
                    message: public_message(&e),
                    details,
                }),
            )
        }
    }
}

/// Recent merchant activity using the default credentials
pub async fn transaction_activity(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let credentials =
        resolve_credentials(&state, None, None, None).map_err(|e| api_error(&e))?;

    let search =
        account::search_transactions(&**state.checkout.gateway(), &credentials, &query)
            .await
            .map_err(|e| api_error(&e))?;

    Ok(Json(ActivityResponse {
        ack: search.ack,
        count: search.transactions.len(),
        transactions: search.transactions,
    }))
}
