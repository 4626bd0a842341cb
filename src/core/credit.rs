//! Credit source resolution.
//!
//! The ledger never decides *which* credit backs a booking; it only executes the
//! consumption or restoration of the source it is handed. Deciding eligibility
//! belongs to a [`CreditResolver`], which outer layers may replace (for example
//! to honour plan-specific rules). [`StoreCreditResolver`] is the default.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::model::Funding;
use crate::core::{LedgerError, LedgerStore};
use crate::util::UserId;

/// Decides which credit source funds a member's booking of a class on a date.
#[async_trait]
pub trait CreditResolver: Send + Sync + 'static {
    /// Pick the funding for `user_id` attending a class dated `on`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientCredit`] when no source can fund the class.
    async fn resolve(&self, user_id: UserId, on: NaiveDate) -> Result<Funding, LedgerError>;
}

/// Prefers the member's active subscription with allowance left, then falls
/// back to invitation credit.
///
/// The resolver reads outside any ledger transaction; the ledger re-checks the
/// chosen source atomically when it consumes it.
pub struct StoreCreditResolver<S> {
    store: Arc<S>,
}

impl<S> StoreCreditResolver<S> {
    /// Resolve against `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> Clone for StoreCreditResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[async_trait]
impl<S: LedgerStore> CreditResolver for StoreCreditResolver<S> {
    async fn resolve(&self, user_id: UserId, on: NaiveDate) -> Result<Funding, LedgerError> {
        if let Some(subscription) = self.store.active_subscription(user_id, on).await? {
            if subscription.has_remaining() {
                return Ok(Funding::Subscription(subscription.id));
            }
            tracing::debug!(
                "subscription {} of user {} exhausted ({}/{})",
                subscription.id,
                user_id,
                subscription.classes_used,
                subscription.classes_allowed
            );
        }

        if self.store.invitation_balance(user_id).await? > 0 {
            return Ok(Funding::Invitation);
        }

        Err(LedgerError::InsufficientCredit(user_id))
    }
}

/// Resolver that always returns the same funding. Useful when the caller has
/// already chosen the source (e.g. an admin booking on a member's behalf).
#[derive(Debug, Clone, Copy)]
pub struct FixedFunding(pub Funding);

#[async_trait]
impl CreditResolver for FixedFunding {
    async fn resolve(&self, _user_id: UserId, _on: NaiveDate) -> Result<Funding, LedgerError> {
        Ok(self.0)
    }
}
