//! Express Checkout Orchestration
//!
//! Implements the three-leg redirect flow:
//!
//! ```text
//! initiate(amount, currency) ──▶ PENDING ──finalize(token, payer)──▶ COMPLETED
//!                                   │  │
//!                                   │  └──finalize rejected──▶ FAILED
//!                                   └──cancel / ttl──▶ ABANDONED
//! ```
//!
//! Each session is finalized at most once. A pending order is claimed in
//! the store before the capture call; a rejected capture deletes it, while
//! a transport failure (timeout, unreachable) releases the claim so the
//! outcome can be reconciled later. A session cancelled during the capture
//! call stays cancelled.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::NvpConfig;
use crate::credentials::Credentials;
use crate::error::{CheckoutError, Result};
use crate::gateway::NvpGateway;
use crate::nvp::{NvpFields, encode_component};
use crate::session::{PendingOrder, SessionStore};

pub const SET_EXPRESS_CHECKOUT: &str = "SetExpressCheckout";
pub const GET_EXPRESS_CHECKOUT_DETAILS: &str = "GetExpressCheckoutDetails";
pub const DO_EXPRESS_CHECKOUT_PAYMENT: &str = "DoExpressCheckoutPayment";

/// Callback and hosted-page settings
#[derive(Clone, Debug)]
pub struct CheckoutOptions {
    pub return_url: String,
    pub cancel_url: String,
    pub web_host: String,
    pub brand_name: String,
}

impl CheckoutOptions {
    pub fn from_config(config: &NvpConfig) -> Self {
        Self {
            return_url: config.return_url(),
            cancel_url: config.cancel_url(),
            web_host: config.environment.web_host().to_string(),
            brand_name: config.brand_name.clone(),
        }
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Provider token
    pub token: String,

    /// URL to redirect the user to
    pub redirect_url: String,

    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Result of a successful capture
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_id: String,
    pub amount: String,
    pub currency: String,
    pub payer_id: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Provider's view of a pending checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    pub token: String,
    pub payer_id: Option<String>,
    pub payer_email: Option<String>,
    pub checkout_status: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,

    /// What the user was quoted at session creation
    pub quoted_amount: String,
    pub quoted_currency: String,
}

/// Express Checkout orchestrator
pub struct ExpressCheckout {
    gateway: Arc<dyn NvpGateway>,
    store: Arc<dyn SessionStore>,
    options: CheckoutOptions,
}

impl ExpressCheckout {
    pub fn new(
        gateway: Arc<dyn NvpGateway>,
        store: Arc<dyn SessionStore>,
        options: CheckoutOptions,
    ) -> Self {
        Self {
            gateway,
            store,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn NvpGateway> {
        &self.gateway
    }

    /// Register an order with the provider and remember it under its token.
    ///
    /// Nothing is sent and nothing is stored when the input is malformed.
    pub async fn initiate(
        &self,
        amount: &str,
        currency: &str,
        credentials: &Credentials,
    ) -> Result<CheckoutSession> {
        validate_amount(amount)?;
        let currency = normalize_currency(currency)?;
        let invoice_id = new_invoice_id();

        tracing::info!(amount, currency = %currency, invoice_id = %invoice_id, "Creating Express Checkout");

        let fields = NvpFields::new()
            .with("RETURNURL", self.options.return_url.as_str())
            .with("CANCELURL", self.options.cancel_url.as_str())
            .with("PAYMENTREQUEST_0_AMT", amount)
            .with("PAYMENTREQUEST_0_CURRENCYCODE", currency.as_str())
            .with("PAYMENTREQUEST_0_PAYMENTACTION", "Sale")
            .with("BRANDNAME", self.options.brand_name.as_str())
            .with("LANDINGPAGE", "Login")
            .with("SOLUTIONTYPE", "Sole")
            .with("USERACTION", "commit")
            .with("PAYMENTREQUEST_0_INVNUM", invoice_id.as_str());

        let response = self
            .gateway
            .call(SET_EXPRESS_CHECKOUT, fields, credentials)
            .await?;

        let token = response
            .get("TOKEN")
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let Some(token) = token else {
            tracing::error!(correlation_id = ?response.correlation_id(), "SetExpressCheckout succeeded without a token");
            return Err(CheckoutError::Gateway {
                method: SET_EXPRESS_CHECKOUT.into(),
                response,
            });
        };

        self.store.put(PendingOrder::new(
            token.clone(),
            amount,
            currency,
            invoice_id,
            credentials.clone(),
        ))?;

        let redirect_url = format!(
            "https://{}/cgi-bin/webscr?cmd=_express-checkout&token={}&useraction=commit",
            self.options.web_host,
            encode_component(&token)
        );

        tracing::info!(token = %token, correlation_id = ?response.correlation_id(), "Express Checkout created");

        Ok(CheckoutSession {
            token,
            redirect_url,
            correlation_id: response.correlation_id().map(str::to_string),
        })
    }

    /// Capture a pending order after the user approved it.
    ///
    /// The stored amount, currency and credentials are used; nothing from
    /// the inbound request can change what is charged.
    pub async fn finalize(&self, token: &str, payer_id: &str) -> Result<Receipt> {
        if payer_id.trim().is_empty() {
            return Err(CheckoutError::Validation("payer id is required".into()));
        }

        let order = self
            .store
            .claim(token)?
            .ok_or(CheckoutError::UnknownSession)?;

        tracing::info!(token = %token, payer_id, amount = %order.amount, currency = %order.currency, "Completing Express Checkout");

        let fields = NvpFields::new()
            .with("TOKEN", token)
            .with("PAYERID", payer_id)
            .with("PAYMENTREQUEST_0_AMT", order.amount.as_str())
            .with("PAYMENTREQUEST_0_CURRENCYCODE", order.currency.as_str())
            .with("PAYMENTREQUEST_0_PAYMENTACTION", "Sale")
            .with("PAYMENTREQUEST_0_INVNUM", order.invoice_id.as_str());

        let result = self
            .gateway
            .call(DO_EXPRESS_CHECKOUT_PAYMENT, fields, &order.credentials)
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e @ CheckoutError::Transport { .. }) => {
                match self.store.release(token) {
                    Ok(true) => {
                        tracing::warn!(token = %token, error = %e, "Capture outcome unknown, keeping session for reconciliation");
                    }
                    Ok(false) => {
                        tracing::warn!(token = %token, error = %e, "Capture outcome unknown, session was closed meanwhile");
                    }
                    Err(store_err) => {
                        tracing::error!(token = %token, error = %store_err, "Failed to release pending session");
                    }
                }
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "Capture rejected, session closed");
                self.close_session(token);
                return Err(e);
            }
        };

        self.close_session(token);

        let transaction_id = response
            .get("PAYMENTINFO_0_TRANSACTIONID")
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let Some(transaction_id) = transaction_id else {
            tracing::error!(token = %token, correlation_id = ?response.correlation_id(), "Capture succeeded without a transaction id");
            return Err(CheckoutError::Gateway {
                method: DO_EXPRESS_CHECKOUT_PAYMENT.into(),
                response,
            });
        };

        tracing::info!(token = %token, transaction_id = %transaction_id, "Payment completed");

        Ok(Receipt {
            transaction_id,
            amount: order.amount,
            currency: order.currency,
            payer_id: payer_id.to_string(),
            correlation_id: response.correlation_id().map(str::to_string),
            timestamp: Utc::now(),
        })
    }

    fn close_session(&self, token: &str) {
        if let Err(e) = self.store.remove(token) {
            tracing::error!(token = %token, error = %e, "Failed to close checkout session");
        }
    }

    /// Handle the provider's return redirect.
    ///
    /// A redirect without both token and payer id never reaches the provider.
    pub async fn finalize_callback(
        &self,
        token: Option<&str>,
        payer_id: Option<&str>,
    ) -> Result<Receipt> {
        match (non_blank(token), non_blank(payer_id)) {
            (Some(token), Some(payer_id)) => self.finalize(token, payer_id).await,
            _ => Err(CheckoutError::MalformedCallback("Missing token or PayerID".into())),
        }
    }

    /// The user abandoned the checkout on the provider's page.
    ///
    /// The token does not have to exist.
    pub fn cancel(&self, token: Option<&str>) -> Result<()> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.store.remove(token)?;
            tracing::info!(token = %token, "Express Checkout cancelled");
        }
        Ok(())
    }

    /// Ask the provider about a pending checkout
    pub async fn details(&self, token: &str) -> Result<CheckoutDetails> {
        let order = self.store.get(token)?.ok_or(CheckoutError::UnknownSession)?;

        let response = self
            .gateway
            .call(
                GET_EXPRESS_CHECKOUT_DETAILS,
                NvpFields::new().with("TOKEN", token),
                &order.credentials,
            )
            .await?;

        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| response.get(key))
                .map(str::to_string)
        };

        Ok(CheckoutDetails {
            token: token.to_string(),
            payer_id: field(&["PAYERID"]),
            payer_email: field(&["EMAIL"]),
            checkout_status: field(&["CHECKOUTSTATUS"]),
            amount: field(&["PAYMENTREQUEST_0_AMT", "AMT"]),
            currency: field(&["PAYMENTREQUEST_0_CURRENCYCODE", "CURRENCYCODE"]),
            quoted_amount: order.amount,
            quoted_currency: order.currency,
        })
    }

    pub fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        self.store.sweep_expired(ttl)
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.store.len()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Positive, finite, plain decimal (`19.99`, `5`, not `1e3` or `1_000`)
fn validate_amount(amount: &str) -> Result<()> {
    let invalid = || CheckoutError::Validation(format!("Valid amount is required, got '{amount}'"));

    if amount.is_empty()
        || amount.matches('.').count() > 1
        || !amount.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(invalid());
    }

    let value = Decimal::from_str(amount).map_err(|_| invalid())?;
    if value <= Decimal::ZERO {
        return Err(invalid());
    }

    Ok(())
}

fn normalize_currency(currency: &str) -> Result<String> {
    let code = currency.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(CheckoutError::Validation(format!(
            "Currency must be a 3-letter code, got '{currency}'"
        )))
    }
}

fn new_invoice_id() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("INV-{}", &id[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, MockReply};
    use crate::nvp::NvpResponse;
    use crate::session::MemorySessionStore;

    struct Harness {
        gateway: Arc<MockGateway>,
        store: Arc<MemorySessionStore>,
        checkout: ExpressCheckout,
    }

    fn harness(replies: impl IntoIterator<Item = MockReply>) -> Harness {
        let gateway = Arc::new(MockGateway::with_replies(replies));
        let store = Arc::new(MemorySessionStore::new());
        let checkout = ExpressCheckout::new(
            gateway.clone(),
            store.clone(),
            CheckoutOptions::from_config(&NvpConfig::default()),
        );
        Harness {
            gateway,
            store,
            checkout,
        }
    }

    fn creds() -> Credentials {
        Credentials::new("merchant_api1.example.com", "pwd", "sig")
    }

    #[tokio::test]
    async fn test_initiate_stores_order_and_builds_redirect() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1&CORRELATIONID=corr1")]);

        let session = h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        assert_eq!(session.token, "EC-1");
        assert!(session.redirect_url.contains("token=EC-1"));
        assert!(session.redirect_url.starts_with("https://www.sandbox.paypal.com/cgi-bin/webscr"));
        assert_eq!(session.correlation_id.as_deref(), Some("corr1"));

        let stored = h.store.get("EC-1").unwrap().unwrap();
        assert_eq!(stored.amount, "19.99");
        assert_eq!(stored.currency, "USD");

        let calls = h.gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, SET_EXPRESS_CHECKOUT);
        assert_eq!(calls[0].fields.get("PAYMENTREQUEST_0_AMT"), Some("19.99"));
        assert_eq!(calls[0].fields.get("PAYMENTREQUEST_0_CURRENCYCODE"), Some("USD"));
        assert_eq!(
            calls[0].fields.get("RETURNURL"),
            Some("http://localhost:3001/api/nvp/return")
        );
        assert_eq!(
            calls[0].fields.get("PAYMENTREQUEST_0_INVNUM"),
            Some(stored.invoice_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_initiate_issues_distinct_tokens() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Success&TOKEN=EC-2"),
        ]);

        let first = h.checkout.initiate("10.00", "USD", &creds()).await.unwrap();
        let second = h.checkout.initiate("10.00", "USD", &creds()).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(second.redirect_url.contains(&format!("token={}", second.token)));
        assert_eq!(h.store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_initiate_rejects_malformed_input_without_calling() {
        let h = harness([]);

        for amount in ["", "abc", "0", "0.00", "-5", "1e3", "1_000", "1.2.3", " 5", "NaN"] {
            let result = h.checkout.initiate(amount, "USD", &creds()).await;
            assert!(
                matches!(result, Err(CheckoutError::Validation(_))),
                "amount {amount:?} should be rejected"
            );
        }
        for currency in ["", "US", "USDX", "U$D"] {
            let result = h.checkout.initiate("5.00", currency, &creds()).await;
            assert!(matches!(result, Err(CheckoutError::Validation(_))));
        }

        assert_eq!(h.gateway.call_count(), 0);
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_initiate_normalizes_currency_case() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1")]);
        h.checkout.initiate("5", "eur", &creds()).await.unwrap();
        assert_eq!(h.store.get("EC-1").unwrap().unwrap().currency, "EUR");
    }

    #[tokio::test]
    async fn test_initiate_gateway_failure_leaves_store_empty() {
        let h = harness([MockReply::body("ACK=Failure&L_LONGMESSAGE0=Invalid")]);

        let err = h.checkout.initiate("19.99", "USD", &creds()).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Gateway { .. }));
        assert_eq!(err.user_message(), "Invalid");
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_initiate_success_without_token_is_gateway_error() {
        let h = harness([MockReply::body("ACK=Success&CORRELATIONID=x")]);
        let err = h.checkout.initiate("19.99", "USD", &creds()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway { .. }));
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_finalize_uses_stored_order() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Success&PAYMENTINFO_0_TRANSACTIONID=T1&CORRELATIONID=c2"),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let receipt = h.checkout.finalize("EC-1", "PAYER1").await.unwrap();

        assert_eq!(receipt.transaction_id, "T1");
        assert_eq!(receipt.amount, "19.99");
        assert_eq!(receipt.currency, "USD");
        assert_eq!(receipt.payer_id, "PAYER1");
        assert_eq!(receipt.correlation_id.as_deref(), Some("c2"));
        assert!(h.store.get("EC-1").unwrap().is_none());

        let calls = h.gateway.calls();
        let capture = &calls[1];
        assert_eq!(capture.method, DO_EXPRESS_CHECKOUT_PAYMENT);
        assert_eq!(capture.user, "merchant_api1.example.com");
        assert_eq!(capture.fields.get("TOKEN"), Some("EC-1"));
        assert_eq!(capture.fields.get("PAYERID"), Some("PAYER1"));
        assert_eq!(capture.fields.get("PAYMENTREQUEST_0_AMT"), Some("19.99"));
        assert_eq!(capture.fields.get("PAYMENTREQUEST_0_CURRENCYCODE"), Some("USD"));
        assert_eq!(
            capture.fields.get("PAYMENTREQUEST_0_INVNUM"),
            calls[0].fields.get("PAYMENTREQUEST_0_INVNUM")
        );
    }

    #[tokio::test]
    async fn test_finalize_twice_is_unknown_session() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Success&PAYMENTINFO_0_TRANSACTIONID=T1"),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();
        h.checkout.finalize("EC-1", "PAYER1").await.unwrap();

        let again = h.checkout.finalize("EC-1", "PAYER1").await;
        assert!(matches!(again, Err(CheckoutError::UnknownSession)));
        assert_eq!(h.gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_finalize_unknown_token_makes_no_call() {
        let h = harness([]);
        let result = h.checkout.finalize("EC-FORGED", "PAYER1").await;
        assert!(matches!(result, Err(CheckoutError::UnknownSession)));
        assert_eq!(h.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_finalize_rejected_closes_session() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Failure&L_LONGMESSAGE0=Payer%20cannot%20pay"),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let err = h.checkout.finalize("EC-1", "PAYER1").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway { .. }));
        assert_eq!(err.user_message(), "Payer cannot pay");
        assert!(h.store.get("EC-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finalize_timeout_keeps_session() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1"), MockReply::Timeout]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();
        let created_at = h.store.get("EC-1").unwrap().unwrap().created_at;

        let err = h.checkout.finalize("EC-1", "PAYER1").await.unwrap_err();
        assert!(err.is_timeout());

        let kept = h.store.get("EC-1").unwrap().unwrap();
        assert_eq!(kept.amount, "19.99");
        assert_eq!(kept.created_at, created_at);
    }

    #[tokio::test]
    async fn test_finalize_retry_after_timeout() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::Timeout,
            MockReply::body("ACK=Success&PAYMENTINFO_0_TRANSACTIONID=T9"),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        assert!(h.checkout.finalize("EC-1", "PAYER1").await.is_err());
        let receipt = h.checkout.finalize("EC-1", "PAYER1").await.unwrap();

        assert_eq!(receipt.transaction_id, "T9");
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_finalize_unreachable_keeps_session() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1"), MockReply::Unreachable]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let err = h.checkout.finalize("EC-1", "PAYER1").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Transport { timeout: false, .. }));

        let kept = h.store.get("EC-1").unwrap().unwrap();
        assert_eq!(kept.amount, "19.99");
        assert_eq!(kept.currency, "USD");
    }

    /// Removes the session while the capture call is in flight, then times out
    struct CancelDuringCapture {
        store: Arc<MemorySessionStore>,
    }

    #[async_trait::async_trait]
    impl NvpGateway for CancelDuringCapture {
        async fn call(
            &self,
            method: &str,
            _fields: NvpFields,
            _credentials: &Credentials,
        ) -> Result<NvpResponse> {
            self.store.remove("EC-1")?;
            Err(CheckoutError::Transport {
                method: method.to_string(),
                message: "operation timed out".into(),
                timeout: true,
            })
        }

        fn name(&self) -> &str {
            "cancel-during-capture"
        }
    }

    #[tokio::test]
    async fn test_cancel_during_capture_stays_cancelled() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .put(PendingOrder::new("EC-1", "19.99", "USD", "INV-1", creds()))
            .unwrap();
        let checkout = ExpressCheckout::new(
            Arc::new(CancelDuringCapture { store: store.clone() }),
            store.clone(),
            CheckoutOptions::from_config(&NvpConfig::default()),
        );

        let err = checkout.finalize("EC-1", "PAYER1").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(store.get("EC-1").unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_capture_without_transaction_id_is_gateway_error() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Success&CORRELATIONID=c3"),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let err = h.checkout.finalize("EC-1", "PAYER1").await.unwrap_err();
        match &err {
            CheckoutError::Gateway { method, response } => {
                assert_eq!(method, DO_EXPRESS_CHECKOUT_PAYMENT);
                assert_eq!(response.correlation_id(), Some("c3"));
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
        assert!(h.store.get("EC-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initiate_transport_failure_stores_nothing() {
        let h = harness([MockReply::Timeout, MockReply::Unreachable]);

        let timeout = h.checkout.initiate("19.99", "USD", &creds()).await.unwrap_err();
        assert!(timeout.is_timeout());
        let unreachable = h.checkout.initiate("19.99", "USD", &creds()).await.unwrap_err();
        assert!(matches!(unreachable, CheckoutError::Transport { timeout: false, .. }));

        assert_eq!(h.gateway.call_count(), 2);
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_finalize_requires_payer_id() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1")]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let result = h.checkout.finalize("EC-1", " ").await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        assert!(h.store.get("EC-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_callback_makes_no_call() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1")]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        for (token, payer) in [(Some("EC-1"), None), (None, Some("PAYER1")), (Some(""), Some("PAYER1"))] {
            let result = h.checkout.finalize_callback(token, payer).await;
            assert!(matches!(result, Err(CheckoutError::MalformedCallback(_))));
        }

        assert_eq!(h.gateway.call_count(), 1);
        assert!(h.store.get("EC-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_removes_session_without_call() {
        let h = harness([MockReply::body("ACK=Success&TOKEN=EC-1")]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        h.checkout.cancel(Some("EC-1")).unwrap();
        h.checkout.cancel(Some("EC-NEVER")).unwrap();
        h.checkout.cancel(None).unwrap();

        assert!(h.store.is_empty().unwrap());
        assert_eq!(h.gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_details_uses_stored_credentials() {
        let h = harness([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body(
                "ACK=Success&TOKEN=EC-1&PAYERID=PAYER1&EMAIL=buyer%40example.com&CHECKOUTSTATUS=PaymentActionNotInitiated&AMT=19.99&CURRENCYCODE=USD",
            ),
        ]);
        h.checkout.initiate("19.99", "USD", &creds()).await.unwrap();

        let details = h.checkout.details("EC-1").await.unwrap();
        assert_eq!(details.payer_id.as_deref(), Some("PAYER1"));
        assert_eq!(details.payer_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(details.amount.as_deref(), Some("19.99"));
        assert_eq!(details.quoted_currency, "USD");

        let calls = h.gateway.calls();
        assert_eq!(calls[1].method, GET_EXPRESS_CHECKOUT_DETAILS);
        assert_eq!(calls[1].user, "merchant_api1.example.com");
        // Details lookup does not consume the session
        assert!(h.store.get("EC-1").unwrap().is_some());
    }

    #[test]
    fn test_invoice_ids_are_unique() {
        let a = new_invoice_id();
        let b = new_invoice_id();
        assert_eq!(a.len(), 16);
        assert!(a.starts_with("INV-"));
        assert_ne!(a, b);
    }
}
