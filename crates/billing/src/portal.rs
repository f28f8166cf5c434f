//! Customer portal session creation (`customer-portal`)

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{BillingGateway, StatusFilter};

/// Response for creating a billing portal session
#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Portal service for self-service billing management
pub struct PortalService<G> {
    gateway: Arc<G>,
    config: StripeConfig,
}

impl<G: BillingGateway> PortalService<G> {
    pub fn new(gateway: Arc<G>, config: StripeConfig) -> Self {
        Self { gateway, config }
    }

    /// Create a short-lived portal session for the user's billing customer.
    ///
    /// Requires an existing customer with at least one subscription of any
    /// status; a user who never subscribed has nothing to manage there.
    pub async fn open_portal(&self, user_id: Uuid, email: &str) -> BillingResult<PortalResponse> {
        let customer = self
            .gateway
            .find_customer_by_email(email)
            .await?
            .ok_or(BillingError::NoCustomer)?;

        let subscriptions = self
            .gateway
            .list_subscriptions(&customer.id, StatusFilter::All)
            .await?;
        if subscriptions.is_empty() {
            return Err(BillingError::NoActiveSubscription);
        }

        let return_url = format!("{}/pricing", self.config.app_base_url);
        let url = self
            .gateway
            .create_portal_session(&customer.id, &return_url)
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created billing portal session"
        );

        Ok(PortalResponse { url })
    }
}
