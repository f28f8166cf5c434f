//! LinkBio Billing Library
//!
//! Subscription lifecycle management backed by Stripe: status
//! reconciliation, checkout, cancellation, and the customer portal, plus
//! the local subscription mirror and per-endpoint rate limiting.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cancel;
pub mod checkout;
pub mod client;
pub mod email;
pub mod error;
pub mod gateway;
pub mod portal;
pub mod rate_limit;
pub mod reconcile;
pub mod store;

pub use cancel::{CancellationOutcome, CancellationService};
pub use checkout::{CheckoutResponse, CheckoutService};
pub use client::{StripeClient, StripeConfig};
pub use email::{BillingEmailService, EmailConfig, TrialReminderService};
pub use error::{BillingError, BillingResult};
pub use gateway::{BillingGateway, StripeGateway};
pub use portal::{PortalResponse, PortalService};
pub use rate_limit::{RateLimitResult, RateLimiter};
pub use reconcile::{ReconciliationService, SubscriptionSummary};
pub use store::{PgSubscriptionStore, SubscriptionRecord, SubscriptionStore};

use std::sync::Arc;

/// All billing services wired to one gateway and one store
pub struct BillingService<G, S> {
    pub reconcile: ReconciliationService<G, S>,
    pub checkout: CheckoutService<G>,
    pub cancel: CancellationService<G, S>,
    pub portal: PortalService<G>,
}

impl<G: BillingGateway, S: SubscriptionStore> BillingService<G, S> {
    pub fn new(gateway: Arc<G>, store: Arc<S>, config: StripeConfig) -> Self {
        Self {
            reconcile: ReconciliationService::new(gateway.clone(), store.clone()),
            checkout: CheckoutService::new(gateway.clone(), config.clone()),
            cancel: CancellationService::new(gateway.clone(), store.clone()),
            portal: PortalService::new(gateway, config),
        }
    }
}

/// Production wiring: Stripe gateway plus the Postgres mirror
pub type Billing = BillingService<StripeGateway, PgSubscriptionStore>;

impl Billing {
    /// Build the production billing stack from the environment.
    pub fn from_env(pool: sqlx::PgPool) -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        let gateway = Arc::new(StripeGateway::new(StripeClient::new(config.clone())));
        let store = Arc::new(PgSubscriptionStore::new(pool));
        Ok(Self::new(gateway, store, config))
    }
}
