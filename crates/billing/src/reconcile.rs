//! Subscription reconciliation
//!
//! Re-derives the local subscription mirror from the authoritative provider
//! state on every status check. This is the only mutation path for the
//! store besides cancellation, and it is idempotent: calling it repeatedly
//! with no provider-side change converges on the same record.

use std::sync::Arc;

use linkbio_shared::{PlanName, SubscriptionStatus};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::gateway::{BillingGateway, StatusFilter, SubscriptionRef};
use crate::store::{SubscriptionRecord, SubscriptionStore};

/// Derived plan status returned to the UI, computed per response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub subscribed: bool,
    pub plan_name: PlanName,
    pub in_trial: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
}

impl SubscriptionSummary {
    fn free() -> Self {
        Self {
            subscribed: false,
            plan_name: PlanName::Free,
            in_trial: false,
            trial_end: None,
            subscription_end: None,
            cancel_at_period_end: false,
        }
    }
}

/// Pick the subscription that represents the user's current plan.
///
/// Tie-break policy when a customer holds several active/trialing
/// subscriptions: active wins over trialing, then the most recently
/// created. The upstream provider leaves this ordering accidental, so we
/// make it explicit.
pub fn select_current(
    active: Vec<SubscriptionRef>,
    trialing: Vec<SubscriptionRef>,
) -> Option<SubscriptionRef> {
    let newest = |subs: Vec<SubscriptionRef>| subs.into_iter().max_by_key(|s| s.created);
    newest(active).or_else(|| newest(trialing))
}

/// Reconciliation service (`check-subscription`)
pub struct ReconciliationService<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
}

impl<G: BillingGateway, S: SubscriptionStore> ReconciliationService<G, S> {
    pub fn new(gateway: Arc<G>, store: Arc<S>) -> Self {
        Self { gateway, store }
    }

    /// Fetch authoritative subscription state from the provider, derive the
    /// normalized status, and upsert it into the store keyed by `user_id`.
    ///
    /// The store write only happens after all gateway data is resolved, so
    /// a gateway failure never commits a partial record.
    pub async fn reconcile(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> BillingResult<SubscriptionSummary> {
        let Some(customer) = self.gateway.find_customer_by_email(email).await? else {
            tracing::info!(user_id = %user_id, "No billing customer, mirroring free plan");
            let record = SubscriptionRecord::free(user_id, email, SubscriptionStatus::Active);
            self.store.upsert(&record).await?;
            return Ok(SubscriptionSummary::free());
        };

        let active = self
            .gateway
            .list_subscriptions(&customer.id, StatusFilter::Active)
            .await?;
        let trialing = self
            .gateway
            .list_subscriptions(&customer.id, StatusFilter::Trialing)
            .await?;

        let Some(subscription) = select_current(active, trialing) else {
            tracing::info!(
                user_id = %user_id,
                customer_id = %customer.id,
                "Customer exists but has no active or trialing subscription"
            );
            let mut record = SubscriptionRecord::free(user_id, email, SubscriptionStatus::Inactive);
            record.stripe_customer_id = Some(customer.id);
            self.store.upsert(&record).await?;
            return Ok(SubscriptionSummary::free());
        };

        let now = OffsetDateTime::now_utc();
        // A past trial_end is never surfaced as "in trial", even though the
        // provider object still carries it
        let in_trial = subscription.trial_end.is_some_and(|t| t > now);
        let trial_end = if in_trial { subscription.trial_end } else { None };

        let status = if subscription.cancel_at_period_end {
            SubscriptionStatus::Canceling
        } else {
            SubscriptionStatus::Active
        };

        let record = SubscriptionRecord {
            user_id,
            email: email.to_string(),
            plan_name: PlanName::Premium,
            status,
            stripe_customer_id: Some(customer.id.clone()),
            stripe_subscription_id: Some(subscription.id.clone()),
            trial_end,
            current_period_end: Some(subscription.current_period_end),
            cancel_at_period_end: subscription.cancel_at_period_end,
            updated_at: now,
        };
        self.store.upsert(&record).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            subscription_id = %subscription.id,
            in_trial,
            cancel_at_period_end = subscription.cancel_at_period_end,
            "Reconciled subscription state"
        );

        Ok(SubscriptionSummary {
            subscribed: true,
            plan_name: PlanName::Premium,
            in_trial,
            trial_end,
            subscription_end: Some(subscription.current_period_end),
            cancel_at_period_end: subscription.cancel_at_period_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::MockGateway;
    use crate::gateway::ProviderStatus;
    use crate::store::MemorySubscriptionStore;
    use time::Duration;

    pub(crate) fn sub(
        id: &str,
        status: ProviderStatus,
        trial_end: Option<OffsetDateTime>,
        created_days_ago: i64,
    ) -> SubscriptionRef {
        let now = OffsetDateTime::now_utc();
        SubscriptionRef {
            id: id.to_string(),
            status,
            trial_end,
            current_period_end: now + Duration::days(30),
            cancel_at_period_end: false,
            created: now - Duration::days(created_days_ago),
        }
    }

    fn service(
        gateway: MockGateway,
    ) -> (
        ReconciliationService<MockGateway, MemorySubscriptionStore>,
        Arc<MemorySubscriptionStore>,
        Arc<MockGateway>,
    ) {
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemorySubscriptionStore::new());
        (
            ReconciliationService::new(gateway.clone(), store.clone()),
            store,
            gateway,
        )
    }

    #[tokio::test]
    async fn test_no_customer_mirrors_free_plan() {
        let (service, store, _) = service(MockGateway::new());
        let user_id = Uuid::new_v4();

        let summary = service.reconcile(user_id, "a@x.com").await.unwrap();

        assert!(!summary.subscribed);
        assert_eq!(summary.plan_name, PlanName::Free);
        assert!(!summary.in_trial);

        let record = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(record.plan_name, PlanName::Free);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.stripe_customer_id, None);
        assert_eq!(record.stripe_subscription_id, None);
        assert_eq!(record.trial_end, None);
    }

    #[tokio::test]
    async fn test_customer_without_subscription_is_free_inactive() {
        let gateway = MockGateway::new().with_customer("a@x.com", "cus_1");
        let (service, store, _) = service(gateway);
        let user_id = Uuid::new_v4();

        let summary = service.reconcile(user_id, "a@x.com").await.unwrap();

        assert!(!summary.subscribed);
        assert_eq!(summary.plan_name, PlanName::Free);

        let record = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Inactive);
        assert_eq!(record.stripe_customer_id, Some("cus_1".to_string()));
    }

    #[tokio::test]
    async fn test_future_trial_is_reported_in_trial() {
        let trial_end = OffsetDateTime::now_utc() + Duration::days(5);
        let gateway = MockGateway::new()
            .with_customer("a@x.com", "cus_1")
            .with_subscription("cus_1", sub("sub_1", ProviderStatus::Trialing, Some(trial_end), 0));
        let (service, store, _) = service(gateway);
        let user_id = Uuid::new_v4();

        let summary = service.reconcile(user_id, "a@x.com").await.unwrap();

        assert!(summary.subscribed);
        assert_eq!(summary.plan_name, PlanName::Premium);
        assert!(summary.in_trial);
        assert_eq!(summary.trial_end, Some(trial_end));
        assert!(!summary.cancel_at_period_end);

        let record = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(record.plan_name, PlanName::Premium);
        assert_eq!(record.trial_end, Some(trial_end));
    }

    #[tokio::test]
    async fn test_expired_trial_is_not_in_trial() {
        let trial_end = OffsetDateTime::now_utc() - Duration::days(1);
        let gateway = MockGateway::new()
            .with_customer("a@x.com", "cus_1")
            .with_subscription("cus_1", sub("sub_1", ProviderStatus::Active, Some(trial_end), 0));
        let (service, _, _) = service(gateway);

        let summary = service.reconcile(Uuid::new_v4(), "a@x.com").await.unwrap();

        assert!(summary.subscribed);
        assert!(!summary.in_trial);
        assert_eq!(summary.trial_end, None);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let gateway = MockGateway::new()
            .with_customer("a@x.com", "cus_1")
            .with_subscription("cus_1", sub("sub_1", ProviderStatus::Active, None, 0));
        let (service, store, _) = service(gateway);
        let user_id = Uuid::new_v4();

        let first = service.reconcile(user_id, "a@x.com").await.unwrap();
        let second = service.reconcile(user_id, "a@x.com").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_canceling_subscription_mirrors_canceling_status() {
        let mut canceling = sub("sub_1", ProviderStatus::Active, None, 0);
        canceling.cancel_at_period_end = true;
        let gateway = MockGateway::new()
            .with_customer("a@x.com", "cus_1")
            .with_subscription("cus_1", canceling);
        let (service, store, _) = service(gateway);
        let user_id = Uuid::new_v4();

        let summary = service.reconcile(user_id, "a@x.com").await.unwrap();

        assert!(summary.cancel_at_period_end);
        let record = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Canceling);
        assert!(record.cancel_at_period_end);
    }

    #[test]
    fn test_select_current_prefers_active_over_trialing() {
        let active = sub("sub_active", ProviderStatus::Active, None, 10);
        let trialing = sub("sub_trial", ProviderStatus::Trialing, None, 0);

        let picked = select_current(vec![active], vec![trialing]).unwrap();
        assert_eq!(picked.id, "sub_active");
    }

    #[test]
    fn test_select_current_prefers_most_recently_created() {
        let older = sub("sub_old", ProviderStatus::Active, None, 30);
        let newer = sub("sub_new", ProviderStatus::Active, None, 1);

        let picked = select_current(vec![older, newer], vec![]).unwrap();
        assert_eq!(picked.id, "sub_new");
    }

    #[test]
    fn test_select_current_empty_is_none() {
        assert!(select_current(vec![], vec![]).is_none());
    }
}
