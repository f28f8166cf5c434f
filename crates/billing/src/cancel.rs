//! Subscription cancellation (`cancel-subscription`)
//!
//! Cancellation always schedules at period end; the subscription stays
//! usable until then. Repeated calls converge to "already scheduled", so
//! the operation is idempotent in outcome even though the provider update
//! runs only once.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{BillingGateway, StatusFilter, SubscriptionRef};
use crate::store::SubscriptionStore;

/// Result of a cancellation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// The subscription was flagged to cancel at the end of the period
    Scheduled { cancel_at: OffsetDateTime },
    /// A previous call already flagged it; nothing was mutated
    AlreadyScheduled { cancel_at: OffsetDateTime },
}

impl CancellationOutcome {
    pub fn cancel_at(&self) -> OffsetDateTime {
        match self {
            Self::Scheduled { cancel_at } | Self::AlreadyScheduled { cancel_at } => *cancel_at,
        }
    }
}

/// Cancellation service
pub struct CancellationService<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
}

impl<G: BillingGateway, S: SubscriptionStore> CancellationService<G, S> {
    pub fn new(gateway: Arc<G>, store: Arc<S>) -> Self {
        Self { gateway, store }
    }

    /// Schedule the user's subscription to cancel at period end and mirror
    /// the transition into the store.
    pub async fn cancel_for_user(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> BillingResult<CancellationOutcome> {
        let customer = self
            .gateway
            .find_customer_by_email(email)
            .await?
            .ok_or(BillingError::NoCustomer)?;

        let subscriptions = self
            .gateway
            .list_subscriptions(&customer.id, StatusFilter::All)
            .await?;

        let target = pick_cancellable(&subscriptions);

        let Some(target) = target else {
            // Converge instead of erroring when a previous call already
            // scheduled the cancellation
            if let Some(scheduled) = subscriptions.iter().find(|s| s.cancel_at_period_end) {
                tracing::info!(
                    user_id = %user_id,
                    subscription_id = %scheduled.id,
                    "Cancellation already scheduled"
                );
                return Ok(CancellationOutcome::AlreadyScheduled {
                    cancel_at: scheduled.current_period_end,
                });
            }
            return Err(BillingError::NoActiveSubscription);
        };

        let updated = self.gateway.set_cancel_at_period_end(&target.id).await?;
        self.store.mark_canceling(user_id).await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %updated.id,
            cancel_at = %updated.current_period_end,
            "Scheduled cancellation at period end"
        );

        Ok(CancellationOutcome::Scheduled {
            cancel_at: updated.current_period_end,
        })
    }
}

/// Pick the subscription to cancel: active, trialing, or past_due, not
/// already flagged, most recently created first.
fn pick_cancellable(subscriptions: &[SubscriptionRef]) -> Option<&SubscriptionRef> {
    subscriptions
        .iter()
        .filter(|s| s.status.is_cancellable() && !s.cancel_at_period_end)
        .max_by_key(|s| s.created)
}
