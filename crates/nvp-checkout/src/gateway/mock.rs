//! Mock Gateway
//!
//! For testing and demo purposes. Replays scripted NVP replies in order and
//! records every call it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{NvpGateway, check_ack};
use crate::credentials::Credentials;
use crate::error::{CheckoutError, Result};
use crate::nvp::{NvpFields, NvpResponse};

/// One scripted reply
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Raw NVP body, ACK-checked like a real reply
    Body(String),
    /// Simulated request timeout
    Timeout,
    /// Simulated connection failure
    Unreachable,
}

impl MockReply {
    pub fn body(body: impl Into<String>) -> Self {
        Self::Body(body.into())
    }
}

/// A call as seen by the mock
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: String,
    pub fields: NvpFields,
    pub user: String,
}

/// Mock gateway with scripted replies
#[derive(Default)]
pub struct MockGateway {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with replies queued in order
    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let gateway = Self::new();
        for reply in replies {
            gateway.push_reply(reply);
        }
        gateway
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl NvpGateway for MockGateway {
    async fn call(
        &self,
        method: &str,
        fields: NvpFields,
        credentials: &Credentials,
    ) -> Result<NvpResponse> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method: method.to_string(),
                fields,
                user: credentials.user.clone(),
            });

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match reply {
            Some(MockReply::Body(body)) => check_ack(method, NvpResponse::parse(&body)),
            Some(MockReply::Timeout) => Err(CheckoutError::Transport {
                method: method.to_string(),
                message: "operation timed out".into(),
                timeout: true,
            }),
            Some(MockReply::Unreachable) => Err(CheckoutError::Transport {
                method: method.to_string(),
                message: "connection refused".into(),
                timeout: false,
            }),
            None => Err(CheckoutError::Transport {
                method: method.to_string(),
                message: "no scripted reply left".into(),
                timeout: false,
            }),
        }
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let gateway = MockGateway::with_replies([
            MockReply::body("ACK=Success&TOKEN=EC-1"),
            MockReply::body("ACK=Failure&L_LONGMESSAGE0=Nope"),
            MockReply::Timeout,
        ]);
        let creds = Credentials::new("u", "p", "s");

        let ok = gateway
            .call("SetExpressCheckout", NvpFields::new(), &creds)
            .await
            .unwrap();
        assert_eq!(ok.get("TOKEN"), Some("EC-1"));

        let rejected = gateway.call("SetExpressCheckout", NvpFields::new(), &creds).await;
        assert!(matches!(rejected, Err(CheckoutError::Gateway { .. })));

        let timed_out = gateway.call("DoExpressCheckoutPayment", NvpFields::new(), &creds).await;
        assert!(timed_out.unwrap_err().is_timeout());

        assert_eq!(gateway.call_count(), 3);
        assert_eq!(gateway.calls()[2].method, "DoExpressCheckoutPayment");
    }
}
