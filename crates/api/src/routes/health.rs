//! Health check endpoints
//!
//! The only hard dependency this service owns is Postgres; Stripe outages
//! surface per-request and are not a reason to pull the instance out of
//! rotation.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
}

impl HealthResponse {
    fn new(database: bool) -> Self {
        Self {
            status: if database { "healthy" } else { "unhealthy" },
            version: env!("CARGO_PKG_VERSION"),
            database,
        }
    }
}

async fn database_reachable(state: &AppState) -> bool {
    sqlx::query("SELECT 1").execute(&state.pool).await.is_ok()
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_reachable(&state).await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::new(database)))
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (checks if the service is ready to accept traffic)
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if database_reachable(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_always_ok() {
        assert_eq!(liveness().await, StatusCode::OK);
    }

    #[test]
    fn test_health_response_reflects_database_state() {
        let healthy = serde_json::to_value(HealthResponse::new(true)).unwrap();
        assert_eq!(healthy["status"], "healthy");
        assert_eq!(healthy["database"], true);

        let unhealthy = serde_json::to_value(HealthResponse::new(false)).unwrap();
        assert_eq!(unhealthy["status"], "unhealthy");
        assert_eq!(unhealthy["database"], false);
    }
}
