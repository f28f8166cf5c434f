//! Billing provider gateway
//!
//! All Stripe traffic goes through the [`BillingGateway`] trait so the
//! reconciliation, checkout, cancellation, and portal services never touch
//! provider-specific request shapes. Swapping the provider means swapping
//! the one implementation below.

use std::collections::HashMap;
use std::time::Duration;

use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
    Customer, CustomerId, IdOrCreate, ListCustomers, ListPrices, ListSubscriptions, Price,
    Subscription, SubscriptionId, SubscriptionStatusFilter, UpdateSubscription,
};
use time::OffsetDateTime;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Upper bound on any single provider round trip. This is a synchronous,
/// user-facing request path; failing fast beats hanging.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// A customer record at the billing provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRef {
    pub id: String,
    pub email: Option<String>,
}

/// Provider-side subscription status, narrowed to what the services act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Other,
}

impl ProviderStatus {
    /// Statuses that can still be flagged to cancel at period end
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

/// A subscription record at the billing provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRef {
    pub id: String,
    pub status: ProviderStatus,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
    pub created: OffsetDateTime,
}

/// Status filter for listing provider subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Active,
    Trialing,
    All,
}

/// Parameters for creating a hosted checkout session
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    /// Existing provider customer, when one is known
    pub customer_id: Option<String>,
    /// Email for provider-side customer creation when no customer exists
    pub customer_email: Option<String>,
    pub price_id: String,
    pub trial_period_days: u32,
    pub success_url: String,
    pub cancel_url: String,
    /// Attached to the resulting subscription for later reconciliation/audit
    pub metadata: HashMap<String, String>,
}

/// Narrow boundary around the external billing provider.
///
/// Implementations must be safe to share across request handlers.
pub trait BillingGateway: Send + Sync {
    /// Look up a customer by email. At most one result is considered.
    fn find_customer_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = BillingResult<Option<CustomerRef>>> + Send;

    /// List a customer's subscriptions in the given status.
    fn list_subscriptions(
        &self,
        customer_id: &str,
        filter: StatusFilter,
    ) -> impl std::future::Future<Output = BillingResult<Vec<SubscriptionRef>>> + Send;

    /// Pick the first active price for a product, if any.
    fn resolve_price_for_product(
        &self,
        product_id: &str,
    ) -> impl std::future::Future<Output = BillingResult<Option<String>>> + Send;

    /// Create a subscription-mode checkout session; returns the hosted URL.
    fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> impl std::future::Future<Output = BillingResult<String>> + Send;

    /// Flag a subscription to stop renewing at the end of the current period.
    fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> impl std::future::Future<Output = BillingResult<SubscriptionRef>> + Send;

    /// Create a self-service billing portal session; returns the hosted URL.
    fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> impl std::future::Future<Output = BillingResult<String>> + Send;
}

/// Production gateway backed by the Stripe API
#[derive(Clone)]
pub struct StripeGateway {
    stripe: StripeClient,
}

impl StripeGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }
}

/// Bound a Stripe call by [`GATEWAY_TIMEOUT`].
async fn bounded<T, F>(op: &'static str, fut: F) -> BillingResult<T>
where
    F: std::future::Future<Output = Result<T, stripe::StripeError>>,
{
    match tokio::time::timeout(GATEWAY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(BillingError::from),
        Err(_) => {
            tracing::error!(op = %op, "Stripe call exceeded timeout");
            Err(BillingError::Timeout)
        }
    }
}

fn parse_customer_id(customer_id: &str) -> BillingResult<CustomerId> {
    customer_id
        .parse::<CustomerId>()
        .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))
}

fn parse_subscription_id(subscription_id: &str) -> BillingResult<SubscriptionId> {
    subscription_id
        .parse::<SubscriptionId>()
        .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))
}

fn timestamp(ts: i64) -> BillingResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| BillingError::StripeApi(format!("Invalid timestamp from Stripe: {}", e)))
}

/// Stripe has no dedicated error code for an unconfigured billing portal;
/// it comes back as an `invalid_request_error` whose message points at the
/// dashboard configuration, so the message check narrows the typed match.
fn portal_not_configured(error_type: &stripe::ErrorType, message: Option<&str>) -> bool {
    matches!(error_type, stripe::ErrorType::InvalidRequest)
        && message.is_some_and(|m| m.contains("configuration"))
}

fn subscription_ref(sub: &Subscription) -> BillingResult<SubscriptionRef> {
    let status = match sub.status {
        stripe::SubscriptionStatus::Active => ProviderStatus::Active,
        stripe::SubscriptionStatus::Trialing => ProviderStatus::Trialing,
        stripe::SubscriptionStatus::PastDue => ProviderStatus::PastDue,
        stripe::SubscriptionStatus::Canceled => ProviderStatus::Canceled,
        _ => ProviderStatus::Other,
    };

    Ok(SubscriptionRef {
        id: sub.id.to_string(),
        status,
        trial_end: sub.trial_end.map(timestamp).transpose()?,
        current_period_end: timestamp(sub.current_period_end)?,
        cancel_at_period_end: sub.cancel_at_period_end,
        created: timestamp(sub.created)?,
    })
}

impl BillingGateway for StripeGateway {
    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<CustomerRef>> {
        let params = ListCustomers {
            email: Some(email),
            limit: Some(1),
            ..Default::default()
        };

        let customers = bounded(
            "list_customers",
            Customer::list(self.stripe.inner(), &params),
        )
        .await?;

        Ok(customers.data.first().map(|c| CustomerRef {
            id: c.id.to_string(),
            email: c.email.clone(),
        }))
    }

    async fn list_subscriptions(
        &self,
        customer_id: &str,
        filter: StatusFilter,
    ) -> BillingResult<Vec<SubscriptionRef>> {
        let customer_id = parse_customer_id(customer_id)?;

        let status = match filter {
            StatusFilter::Active => SubscriptionStatusFilter::Active,
            StatusFilter::Trialing => SubscriptionStatusFilter::Trialing,
            StatusFilter::All => SubscriptionStatusFilter::All,
        };

        let params = ListSubscriptions {
            customer: Some(customer_id),
            status: Some(status),
            ..Default::default()
        };

        let subscriptions = bounded(
            "list_subscriptions",
            Subscription::list(self.stripe.inner(), &params),
        )
        .await?;

        subscriptions.data.iter().map(subscription_ref).collect()
    }

    async fn resolve_price_for_product(&self, product_id: &str) -> BillingResult<Option<String>> {
        let params = ListPrices {
            product: Some(IdOrCreate::Id(product_id)),
            active: Some(true),
            limit: Some(1),
            ..Default::default()
        };

        let prices = bounded("list_prices", Price::list(self.stripe.inner(), &params)).await?;

        Ok(prices.data.first().map(|p| p.id.to_string()))
    }

    async fn create_checkout_session(&self, params: CheckoutParams) -> BillingResult<String> {
        let customer_id = params
            .customer_id
            .as_deref()
            .map(parse_customer_id)
            .transpose()?;

        let mut create = CreateCheckoutSession::new();
        create.customer = customer_id;
        // Stripe creates the customer from the email at session time when
        // no customer is attached
        if create.customer.is_none() {
            create.customer_email = params.customer_email.as_deref();
        }
        create.mode = Some(CheckoutSessionMode::Subscription);
        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            trial_period_days: Some(params.trial_period_days),
            metadata: Some(params.metadata.clone()),
            ..Default::default()
        });

        let session = bounded(
            "create_checkout_session",
            CheckoutSession::create(self.stripe.inner(), create),
        )
        .await?;

        session
            .url
            .ok_or_else(|| BillingError::StripeApi("Checkout session URL missing".to_string()))
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionRef> {
        let sub_id = parse_subscription_id(subscription_id)?;

        let mut update = UpdateSubscription::new();
        update.cancel_at_period_end = Some(true);

        let subscription = bounded(
            "update_subscription",
            Subscription::update(self.stripe.inner(), &sub_id, update),
        )
        .await?;

        subscription_ref(&subscription)
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<String> {
        let customer_id = parse_customer_id(customer_id)?;

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(return_url);

        let result = tokio::time::timeout(
            GATEWAY_TIMEOUT,
            BillingPortalSession::create(self.stripe.inner(), params),
        )
        .await;

        match result {
            Ok(Ok(session)) => Ok(session.url),
            Ok(Err(stripe::StripeError::Stripe(req_err)))
                if portal_not_configured(&req_err.error_type, req_err.message.as_deref()) =>
            {
                Err(BillingError::PortalNotConfigured)
            }
            Ok(Err(e)) => Err(BillingError::from(e)),
            Err(_) => {
                tracing::error!(op = "create_portal_session", "Stripe call exceeded timeout");
                Err(BillingError::Timeout)
            }
        }
    }
}
