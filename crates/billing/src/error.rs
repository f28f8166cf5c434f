//! Billing error types
//!
//! Every failure is a typed variant constructed at the point of failure.
//! `is_user_facing` decides whether the message may be shown to the caller;
//! internal variants are logged in full server-side and surfaced only as a
//! generic message by the API layer.

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("No billing customer found for this user")]
    NoCustomer,

    #[error("No active subscription found")]
    NoActiveSubscription,

    #[error("Invalid plan selected: {0}")]
    InvalidPlan(String),

    #[error("No active price found for the selected plan")]
    NoActivePrice(String),

    #[error("The billing portal is not configured. Enable it in the Stripe dashboard under Settings > Billing > Customer Portal")]
    PortalNotConfigured,

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Billing provider request timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// Whether this error's message is safe to surface to the end user.
    /// Internal failures (provider, database, config) must never leak detail.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Self::NoCustomer
            | Self::NoActiveSubscription
            | Self::InvalidPlan(_)
            | Self::NoActivePrice(_)
            | Self::PortalNotConfigured => true,
            Self::StripeApi(_) | Self::Timeout | Self::Database(_) | Self::Config(_) => false,
        }
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_not_user_facing() {
        assert!(!BillingError::StripeApi("card declined".into()).is_user_facing());
        assert!(!BillingError::Database("connection reset".into()).is_user_facing());
        assert!(!BillingError::Timeout.is_user_facing());
    }

    #[test]
    fn test_actionable_errors_are_user_facing() {
        assert!(BillingError::NoCustomer.is_user_facing());
        assert!(BillingError::NoActiveSubscription.is_user_facing());
        assert!(BillingError::InvalidPlan("weekly".into()).is_user_facing());
        assert!(BillingError::PortalNotConfigured.is_user_facing());
    }
}
