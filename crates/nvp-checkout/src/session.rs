//! Pending Checkout Sessions
//!
//! Bridges the three legs of an Express Checkout: the order is remembered
//! under its provider token between session creation and the return
//! callback.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::credentials::Credentials;
use crate::error::{CheckoutError, Result};

/// An order authorized for approval but not yet captured
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingOrder {
    /// Provider-issued token, the only key
    pub token: String,

    /// Amount exactly as quoted to the user
    pub amount: String,

    /// 3-letter currency code
    pub currency: String,

    /// Invoice number sent at session creation, reused at capture
    pub invoice_id: String,

    /// Merchant account the session was created under
    pub credentials: Credentials,

    /// Creation timestamp, used only for expiry
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    pub fn new(
        token: impl Into<String>,
        amount: impl Into<String>,
        currency: impl Into<String>,
        invoice_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            token: token.into(),
            amount: amount.into(),
            currency: currency.into(),
            invoice_id: invoice_id.into(),
            credentials,
            created_at: Utc::now(),
        }
    }

    /// Whether this order is older than `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .is_some_and(|cutoff| self.created_at < cutoff)
    }
}

/// Session storage trait
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the order under its token
    fn put(&self, order: PendingOrder) -> Result<()>;

    /// Look up a pending order
    fn get(&self, token: &str) -> Result<Option<PendingOrder>>;

    /// Mark a pending order as in flight and return it.
    ///
    /// Returns `None` when the token is absent or already claimed, so at
    /// most one caller holds a claim. A claimed order stays in the store
    /// until it is removed or released.
    fn claim(&self, token: &str) -> Result<Option<PendingOrder>>;

    /// Drop the claim on an order that is still present.
    ///
    /// Returns `false` when the order was removed in the meantime; a removed
    /// order is never brought back.
    fn release(&self, token: &str) -> Result<bool>;

    /// Delete a pending order, claimed or not; deleting an absent token is
    /// not an error
    fn remove(&self, token: &str) -> Result<()>;

    /// Remove every order older than `ttl`, returning how many were removed
    fn sweep_expired(&self, ttl: Duration) -> Result<usize>;

    /// Number of pending orders
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory session store.
///
/// Not durable: a restart drops every pending session.
pub struct MemorySessionStore {
    orders: RwLock<HashMap<String, Entry>>,
}

struct Entry {
    order: PendingOrder,
    claimed: bool,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned<T>(_: PoisonError<T>) -> CheckoutError {
        CheckoutError::Storage("session store lock poisoned".into())
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, order: PendingOrder) -> Result<()> {
        if order.token.trim().is_empty() {
            return Err(CheckoutError::Validation("session token must not be empty".into()));
        }

        let mut orders = self.orders.write().map_err(Self::poisoned)?;
        orders.insert(
            order.token.clone(),
            Entry {
                order,
                claimed: false,
            },
        );
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<PendingOrder>> {
        let orders = self.orders.read().map_err(Self::poisoned)?;
        Ok(orders.get(token).map(|entry| entry.order.clone()))
    }

    fn claim(&self, token: &str) -> Result<Option<PendingOrder>> {
        let mut orders = self.orders.write().map_err(Self::poisoned)?;
        match orders.get_mut(token) {
            Some(entry) if !entry.claimed => {
                entry.claimed = true;
                Ok(Some(entry.order.clone()))
            }
            _ => Ok(None),
        }
    }

    fn release(&self, token: &str) -> Result<bool> {
        let mut orders = self.orders.write().map_err(Self::poisoned)?;
        match orders.get_mut(token) {
            Some(entry) => {
                entry.claimed = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, token: &str) -> Result<()> {
        let mut orders = self.orders.write().map_err(Self::poisoned)?;
        orders.remove(token);
        Ok(())
    }

    fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut orders = self.orders.write().map_err(Self::poisoned)?;

        let before = orders.len();
        orders.retain(|_, entry| !entry.order.is_expired(ttl, now));
        Ok(before - orders.len())
    }

    fn len(&self) -> Result<usize> {
        let orders = self.orders.read().map_err(Self::poisoned)?;
        Ok(orders.len())
    }
}

/// Periodically sweep expired sessions on a background task
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: Duration, ttl: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.sweep_expired(ttl) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired checkout sessions"),
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}
