//! Billing routes
//!
//! Thin HTTP layer over the billing services: authenticate, rate limit,
//! delegate, map errors. All business logic lives in the billing crate.

use axum::{
    extract::{Extension, State},
    Json,
};
use linkbio_billing::{
    CancellationOutcome, CheckoutResponse, PortalResponse, SubscriptionSummary,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// "monthly" or "yearly"
    pub plan: String,
}

/// Response for a cancellation request. "Already scheduled" gets the same
/// success shape with a different message.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "cancelAt", with = "time::serde::rfc3339")]
    pub cancel_at: OffsetDateTime,
}

/// Reconcile and return the user's subscription status
pub async fn check_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let limit = state
        .rate_limiter
        .check_status(&auth_user.user_id.to_string())
        .await;
    if !limit.allowed {
        return Err(ApiError::RateLimited);
    }

    let summary = state
        .billing
        .reconcile
        .reconcile(auth_user.user_id, &auth_user.email)
        .await
        .map_err(|e| ApiError::billing(e, "checking subscription status"))?;

    Ok(Json(summary))
}

/// Create a hosted checkout session for the selected plan
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let limit = state
        .rate_limiter
        .check_checkout(&auth_user.user_id.to_string())
        .await;
    if !limit.allowed {
        return Err(ApiError::RateLimited);
    }

    let response = state
        .billing
        .checkout
        .start_checkout(auth_user.user_id, &auth_user.email, &req.plan)
        .await
        .map_err(|e| ApiError::billing(e, "creating the checkout session"))?;

    Ok(Json(response))
}

/// Schedule the user's subscription to cancel at period end
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<CancelResponse>, ApiError> {
    let limit = state
        .rate_limiter
        .check_cancel(&auth_user.user_id.to_string())
        .await;
    if !limit.allowed {
        return Err(ApiError::RateLimited);
    }

    let outcome = state
        .billing
        .cancel
        .cancel_for_user(auth_user.user_id, &auth_user.email)
        .await
        .map_err(|e| ApiError::billing(e, "canceling the subscription"))?;

    let response = match outcome {
        CancellationOutcome::Scheduled { cancel_at } => CancelResponse {
            success: true,
            message: "Subscription will be canceled at the end of the billing period".to_string(),
            cancel_at,
        },
        CancellationOutcome::AlreadyScheduled { cancel_at } => CancelResponse {
            success: true,
            message: "Subscription is already scheduled to cancel".to_string(),
            cancel_at,
        },
    };

    Ok(Json(response))
}

/// Open a billing portal session for self-service management
pub async fn customer_portal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<PortalResponse>, ApiError> {
    let limit = state
        .rate_limiter
        .check_portal(&auth_user.user_id.to_string())
        .await;
    if !limit.allowed {
        return Err(ApiError::RateLimited);
    }

    let response = state
        .billing
        .portal
        .open_portal(auth_user.user_id, &auth_user.email)
        .await
        .map_err(|e| ApiError::billing(e, "opening the billing portal"))?;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The frontend reads the cancellation date as camelCase `cancelAt`.
    #[test]
    fn test_cancel_response_serializes_cancel_at_as_camel_case() {
        let response = CancelResponse {
            success: true,
            message: "Subscription will be canceled at the end of the billing period".to_string(),
            cancel_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["cancelAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("cancel_at").is_none());
    }
}
