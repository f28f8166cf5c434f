//! Stripe client configuration

use linkbio_shared::BillingPlan;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Product ID for the monthly premium plan
    pub product_monthly: String,
    /// Product ID for the yearly premium plan
    pub product_yearly: String,
    /// Trial length granted at checkout, in days
    pub trial_period_days: u32,
    /// Base URL for success/cancel/portal redirects
    pub app_base_url: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            product_monthly: std::env::var("STRIPE_PRODUCT_MONTHLY")
                .map_err(|_| BillingError::Config("STRIPE_PRODUCT_MONTHLY not set".to_string()))?,
            product_yearly: std::env::var("STRIPE_PRODUCT_YEARLY")
                .map_err(|_| BillingError::Config("STRIPE_PRODUCT_YEARLY not set".to_string()))?,
            trial_period_days: std::env::var("STRIPE_TRIAL_PERIOD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Get the Stripe product ID for a billing plan
    pub fn product_id_for_plan(&self, plan: BillingPlan) -> &str {
        match plan {
            BillingPlan::Monthly => &self.product_monthly,
            BillingPlan::Yearly => &self.product_yearly,
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
