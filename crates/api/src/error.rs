//! API error types and handling
//!
//! Every response body is the flat shape `{"error": "..."}`. Billing
//! errors carry an `is_user_facing` flag; internal ones are logged in full
//! and surfaced only as a generic "An error occurred while <action>".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use linkbio_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("User not authenticated")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("{source}")]
    Billing {
        source: BillingError,
        /// Present-participle description used in the sanitized message,
        /// e.g. "checking subscription status"
        action: &'static str,
    },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn billing(source: BillingError, action: &'static str) -> Self {
        Self::Billing { source, action }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ApiError::Billing { source, action } => {
                if source.is_user_facing() {
                    (StatusCode::BAD_REQUEST, source.to_string())
                } else {
                    tracing::error!(error = %source, error_debug = ?source, "Billing request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("An error occurred while {}", action),
                    )
                }
            }
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_user_facing_billing_error_keeps_message() {
        let (status, body) = body_json(ApiError::billing(
            BillingError::NoCustomer,
            "opening the billing portal",
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No billing customer found for this user");
    }

    #[tokio::test]
    async fn test_internal_billing_error_is_sanitized() {
        let (status, body) = body_json(ApiError::billing(
            BillingError::StripeApi("secret key sk_live_123 rejected".into()),
            "checking subscription status",
        ))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "An error occurred while checking subscription status"
        );
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let (status, body) = body_json(ApiError::RateLimited).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too many requests. Please try again later.");
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let (status, body) = body_json(ApiError::Unauthorized).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "User not authenticated");
    }
}
