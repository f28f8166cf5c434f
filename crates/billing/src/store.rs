//! Subscription store
//!
//! The persisted local mirror of billing state, one row per user. The
//! billing provider remains the source of truth; this table is a disposable
//! cache that reconciliation rewrites on every status check.

use linkbio_shared::{PlanName, SubscriptionStatus};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Local mirror of a user's subscription state
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub email: String,
    pub plan_name: PlanName,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub updated_at: OffsetDateTime,
}

impl SubscriptionRecord {
    /// Record for a user with no provider subscription.
    /// `status` distinguishes "never had a customer" (Active on free plan)
    /// from "customer exists but unsubscribed" (Inactive).
    pub fn free(user_id: Uuid, email: &str, status: SubscriptionStatus) -> Self {
        Self {
            user_id,
            email: email.to_string(),
            plan_name: PlanName::Free,
            status,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            trial_end: None,
            current_period_end: None,
            cancel_at_period_end: false,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Persistence boundary for subscription records.
/// Upserts are keyed by `user_id`; concurrent writes are last-write-wins.
pub trait SubscriptionStore: Send + Sync {
    fn upsert(
        &self,
        record: &SubscriptionRecord,
    ) -> impl std::future::Future<Output = BillingResult<()>> + Send;

    fn get(
        &self,
        user_id: Uuid,
    ) -> impl std::future::Future<Output = BillingResult<Option<SubscriptionRecord>>> + Send;

    /// Flag an existing record as canceling at period end
    fn mark_canceling(
        &self,
        user_id: Uuid,
    ) -> impl std::future::Future<Output = BillingResult<()>> + Send;

    /// Active records whose trial ends inside the window (for reminders)
    fn trials_ending_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> impl std::future::Future<Output = BillingResult<Vec<SubscriptionRecord>>> + Send;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SubscriptionStore for PgSubscriptionStore {
    async fn upsert(&self, record: &SubscriptionRecord) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                user_id, email, plan_name, status,
                stripe_customer_id, stripe_subscription_id,
                trial_end, current_period_end, cancel_at_period_end, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                email = EXCLUDED.email,
                plan_name = EXCLUDED.plan_name,
                status = EXCLUDED.status,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                trial_end = EXCLUDED.trial_end,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(record.user_id)
        .bind(&record.email)
        .bind(record.plan_name)
        .bind(record.status)
        .bind(&record.stripe_customer_id)
        .bind(&record.stripe_subscription_id)
        .bind(record.trial_end)
        .bind(record.current_period_end)
        .bind(record.cancel_at_period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> BillingResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT user_id, email, plan_name, status, stripe_customer_id, \
             stripe_subscription_id, trial_end, current_period_end, \
             cancel_at_period_end, updated_at \
             FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_canceling(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE subscriptions \
             SET cancel_at_period_end = TRUE, status = 'canceling', updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn trials_ending_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionRecord>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT user_id, email, plan_name, status, stripe_customer_id, \
             stripe_subscription_id, trial_end, current_period_end, \
             cancel_at_period_end, updated_at \
             FROM subscriptions \
             WHERE trial_end IS NOT NULL AND trial_end >= $1 AND trial_end <= $2 \
             AND status = 'active'",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// In-memory store (for tests and development without Postgres)
#[derive(Default)]
pub struct MemorySubscriptionStore {
    records: tokio::sync::RwLock<std::collections::HashMap<Uuid, SubscriptionRecord>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held (upserts must never grow this per user)
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    async fn upsert(&self, record: &SubscriptionRecord) -> BillingResult<()> {
        let mut records = self.records.write().await;
        let mut record = record.clone();
        record.updated_at = OffsetDateTime::now_utc();
        records.insert(record.user_id, record);
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> BillingResult<Option<SubscriptionRecord>> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn mark_canceling(&self, user_id: Uuid) -> BillingResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&user_id) {
            record.cancel_at_period_end = true;
            record.status = linkbio_shared::SubscriptionStatus::Canceling;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn trials_ending_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| {
                r.status == linkbio_shared::SubscriptionStatus::Active
                    && r.trial_end.is_some_and(|t| t >= from && t <= to)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkbio_shared::SubscriptionStatus;

    #[tokio::test]
    async fn test_memory_store_upsert_is_keyed_by_user() {
        let store = MemorySubscriptionStore::new();
        let user_id = Uuid::new_v4();

        let record = SubscriptionRecord::free(user_id, "a@x.com", SubscriptionStatus::Active);
        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(stored.plan_name, PlanName::Free);
        assert_eq!(stored.stripe_customer_id, None);
    }

    #[tokio::test]
    async fn test_mark_canceling_sets_both_fields() {
        let store = MemorySubscriptionStore::new();
        let user_id = Uuid::new_v4();

        let mut record = SubscriptionRecord::free(user_id, "a@x.com", SubscriptionStatus::Active);
        record.plan_name = PlanName::Premium;
        record.stripe_customer_id = Some("cus_1".to_string());
        store.upsert(&record).await.unwrap();

        store.mark_canceling(user_id).await.unwrap();

        let stored = store.get(user_id).await.unwrap().unwrap();
        assert!(stored.cancel_at_period_end);
        assert_eq!(stored.status, SubscriptionStatus::Canceling);
    }

    #[tokio::test]
    async fn test_trials_ending_between_filters_window_and_status() {
        let store = MemorySubscriptionStore::new();
        let now = OffsetDateTime::now_utc();

        let mut in_window = SubscriptionRecord::free(
            Uuid::new_v4(),
            "soon@x.com",
            SubscriptionStatus::Active,
        );
        in_window.trial_end = Some(now + time::Duration::days(2));
        store.upsert(&in_window).await.unwrap();

        let mut out_of_window = SubscriptionRecord::free(
            Uuid::new_v4(),
            "later@x.com",
            SubscriptionStatus::Active,
        );
        out_of_window.trial_end = Some(now + time::Duration::days(10));
        store.upsert(&out_of_window).await.unwrap();

        let mut inactive = SubscriptionRecord::free(
            Uuid::new_v4(),
            "gone@x.com",
            SubscriptionStatus::Inactive,
        );
        inactive.trial_end = Some(now + time::Duration::days(2));
        store.upsert(&inactive).await.unwrap();

        let due = store
            .trials_ending_between(now + time::Duration::days(1), now + time::Duration::days(3))
            .await
            .unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].email, "soon@x.com");
    }
}
