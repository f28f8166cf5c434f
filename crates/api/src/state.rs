//! Shared application state

use std::sync::Arc;

use linkbio_billing::{Billing, RateLimiter};
use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::config::Config;

/// State shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub billing: Arc<Billing>,
    pub jwt: JwtManager,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, billing: Billing) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret);
        Self {
            pool,
            config: Arc::new(config),
            billing: Arc::new(billing),
            jwt,
            rate_limiter: RateLimiter::shared(),
        }
    }
}
