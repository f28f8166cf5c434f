//! API routes

pub mod billing;
pub mod health;

use axum::{middleware, routing::get, routing::post, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Billing routes (auth required) - under /api/v1
    let billing_routes = Router::new()
        .route("/billing/check-subscription", post(billing::check_subscription))
        .route("/billing/create-checkout", post(billing::create_checkout))
        .route("/billing/cancel-subscription", post(billing::cancel_subscription))
        .route("/billing/customer-portal", post(billing::customer_portal))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", billing_routes)
        // Endpoints are called from the browser app directly
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
