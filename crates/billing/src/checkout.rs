//! Checkout initiation (`create-checkout`)

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use linkbio_shared::BillingPlan;
use serde::Serialize;
use uuid::Uuid;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{BillingGateway, CheckoutParams};

/// Response for creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Checkout service for starting paid subscriptions.
///
/// Not idempotent: every call creates a new provider-side checkout session.
/// The UI is responsible for not double-submitting.
pub struct CheckoutService<G> {
    gateway: Arc<G>,
    config: StripeConfig,
}

impl<G: BillingGateway> CheckoutService<G> {
    pub fn new(gateway: Arc<G>, config: StripeConfig) -> Self {
        Self { gateway, config }
    }

    /// Create a hosted checkout session for the selected plan, with the
    /// configured trial period.
    ///
    /// The plan is validated before any gateway call is made.
    pub async fn start_checkout(
        &self,
        user_id: Uuid,
        email: &str,
        plan: &str,
    ) -> BillingResult<CheckoutResponse> {
        let plan = BillingPlan::from_str(plan)
            .map_err(|_| BillingError::InvalidPlan(plan.to_string()))?;

        // Reuse an existing customer; otherwise Stripe creates one from the
        // email when the session completes
        let customer = self.gateway.find_customer_by_email(email).await?;

        let product_id = self.config.product_id_for_plan(plan);
        let price_id = self
            .gateway
            .resolve_price_for_product(product_id)
            .await?
            .ok_or_else(|| BillingError::NoActivePrice(plan.to_string()))?;

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan_name".to_string(), "premium".to_string());

        let base_url = &self.config.app_base_url;
        let params = CheckoutParams {
            customer_id: customer.as_ref().map(|c| c.id.clone()),
            customer_email: customer.is_none().then(|| email.to_string()),
            price_id,
            trial_period_days: self.config.trial_period_days,
            success_url: format!("{}/pricing?success=true", base_url),
            cancel_url: format!("{}/pricing?canceled=true", base_url),
            metadata,
        };

        let url = self.gateway.create_checkout_session(params).await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            has_existing_customer = customer.is_some(),
            "Created checkout session"
        );

        Ok(CheckoutResponse { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::MockGateway;

    fn config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            product_monthly: "prod_monthly".to_string(),
            product_yearly: "prod_yearly".to_string(),
            trial_period_days: 15,
            app_base_url: "https://app.test".to_string(),
        }
    }

    fn service(gateway: MockGateway) -> (CheckoutService<MockGateway>, Arc<MockGateway>) {
        let gateway = Arc::new(gateway);
        (CheckoutService::new(gateway.clone(), config()), gateway)
    }

    #[tokio::test]
    async fn test_invalid_plan_rejected_before_any_gateway_call() {
        let (service, gateway) = service(MockGateway::new());

        let err = service
            .start_checkout(Uuid::new_v4(), "a@x.com", "weekly")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidPlan(p) if p == "weekly"));
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_checkout_with_existing_customer() {
        let gateway = MockGateway::new()
            .with_customer("a@x.com", "cus_1")
            .with_price("prod_monthly", "price_monthly");
        let (service, gateway) = service(gateway);
        let user_id = Uuid::new_v4();

        let response = service
            .start_checkout(user_id, "a@x.com", "monthly")
            .await
            .unwrap();

        assert!(response.url.starts_with("https://"));

        let params = gateway.last_checkout.lock().unwrap().clone().unwrap();
        assert_eq!(params.customer_id, Some("cus_1".to_string()));
        assert_eq!(params.customer_email, None);
        assert_eq!(params.price_id, "price_monthly");
        assert_eq!(params.trial_period_days, 15);
        assert_eq!(params.metadata.get("user_id"), Some(&user_id.to_string()));
        assert_eq!(
            params.metadata.get("plan_name"),
            Some(&"premium".to_string())
        );
    }

    #[tokio::test]
    async fn test_checkout_without_customer_passes_email() {
        let gateway = MockGateway::new().with_price("prod_yearly", "price_yearly");
        let (service, gateway) = service(gateway);

        service
            .start_checkout(Uuid::new_v4(), "new@x.com", "yearly")
            .await
            .unwrap();

        let params = gateway.last_checkout.lock().unwrap().clone().unwrap();
        assert_eq!(params.customer_id, None);
        assert_eq!(params.customer_email, Some("new@x.com".to_string()));
        assert_eq!(params.price_id, "price_yearly");
    }

    #[tokio::test]
    async fn test_missing_active_price_is_distinct_error() {
        let gateway = MockGateway::new().with_customer("a@x.com", "cus_1");
        let (service, gateway) = service(gateway);

        let err = service
            .start_checkout(Uuid::new_v4(), "a@x.com", "monthly")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::NoActivePrice(_)));
        assert_eq!(gateway.calls_of("create_checkout_session"), 0);
    }
}
