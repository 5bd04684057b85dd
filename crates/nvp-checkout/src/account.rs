//! Merchant Account Calls
//!
//! Stateless NVP calls outside the checkout flow: `GetBalance` as a
//! credential check and `TransactionSearch` for recent activity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::Result;
use crate::gateway::NvpGateway;
use crate::nvp::{NvpFields, NvpResponse};

pub const GET_BALANCE: &str = "GetBalance";
pub const TRANSACTION_SEARCH: &str = "TransactionSearch";

/// One currency balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub amount: String,
    pub currency: String,
}

/// Outcome of a successful credential check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Balance {
    pub balances: Vec<BalanceEntry>,
    pub response: NvpResponse,
}

/// Verify credentials by asking for the account balance
pub async fn check_credentials(
    gateway: &dyn NvpGateway,
    credentials: &Credentials,
) -> Result<Balance> {
    tracing::info!(user = %credentials.user, "Testing PayPal NVP credentials");

    let response = gateway.call(GET_BALANCE, NvpFields::new(), credentials).await?;
    let balances = response
        .indexed("L_")
        .into_iter()
        .filter_map(|mut record| {
            Some(BalanceEntry {
                amount: record.remove("L_AMT")?,
                currency: record.remove("L_CURRENCYCODE").unwrap_or_default(),
            })
        })
        .collect();

    Ok(Balance { balances, response })
}

/// Filters for a transaction search
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub transaction_id: Option<String>,
    pub status: Option<String>,
}

impl TransactionQuery {
    pub fn starting(start_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            ..Default::default()
        }
    }

    fn to_fields(&self) -> NvpFields {
        let mut fields = NvpFields::new();

        // STARTDATE is mandatory for the provider; default to today
        let start = self
            .start_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        fields.push("STARTDATE", format!("{}T00:00:00Z", start.format("%Y-%m-%d")));

        if let Some(end) = self.end_date {
            fields.push("ENDDATE", format!("{}T23:59:59Z", end.format("%Y-%m-%d")));
        }
        let optional = [
            ("EMAIL", &self.email),
            ("TRANSACTIONID", &self.transaction_id),
            ("STATUS", &self.status),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                fields.push(key, value);
            }
        }
        fields
    }
}

/// One row of a transaction search
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    pub name: String,
    pub transaction_id: String,
    pub status: String,
    pub amount: String,
    pub currency: String,
    pub fee: String,
    pub net: String,
}

/// Transaction search outcome
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionSearch {
    pub ack: String,
    pub transactions: Vec<TransactionRecord>,
}

/// Search the merchant's recent transactions
pub async fn search_transactions(
    gateway: &dyn NvpGateway,
    credentials: &Credentials,
    query: &TransactionQuery,
) -> Result<TransactionSearch> {
    let response = gateway
        .call(TRANSACTION_SEARCH, query.to_fields(), credentials)
        .await?;
    let transactions = parse_transaction_records(&response);

    tracing::info!(count = transactions.len(), ack = response.ack(), "Transaction search completed");
    Ok(TransactionSearch {
        ack: response.ack().to_string(),
        transactions,
    })
}

/// Flatten indexed `L_*` fields into records ordered by index
pub fn parse_transaction_records(response: &NvpResponse) -> Vec<TransactionRecord> {
    response
        .indexed("L_")
        .into_iter()
        .map(|mut rec| {
            let mut take = |key: &str| rec.remove(key).unwrap_or_default();
            TransactionRecord {
                timestamp: take("L_TIMESTAMP"),
                kind: take("L_TYPE"),
                email: take("L_EMAIL"),
                name: take("L_NAME"),
                transaction_id: take("L_TRANSACTIONID"),
                status: take("L_STATUS"),
                amount: take("L_AMT"),
                currency: take("L_CURRENCYCODE"),
                fee: take("L_FEEAMT"),
                net: take("L_NETAMT"),
            }
        })
        .collect()
}
