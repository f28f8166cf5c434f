//! In-memory rate limiting for billing endpoints
//!
//! Per-user fixed windows anchored at the first request. Limits are
//! configurable via environment variables:
//! - `RATE_LIMIT_STATUS_PER_MINUTE`: Subscription status checks (default: 20)
//! - `RATE_LIMIT_CHECKOUT_PER_MINUTE`: Checkout session creation (default: 5)
//! - `RATE_LIMIT_CANCEL_PER_MINUTE`: Cancellation requests (default: 3)
//! - `RATE_LIMIT_PORTAL_PER_MINUTE`: Portal session creation (default: 5)

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use time::OffsetDateTime;

/// Get configurable status check rate limit per minute
fn get_status_rate_limit() -> u32 {
    static LIMIT: OnceLock<u32> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        std::env::var("RATE_LIMIT_STATUS_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20)
    })
}

/// Get configurable checkout rate limit per minute
fn get_checkout_rate_limit() -> u32 {
    static LIMIT: OnceLock<u32> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        std::env::var("RATE_LIMIT_CHECKOUT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5)
    })
}

/// Get configurable cancellation rate limit per minute
fn get_cancel_rate_limit() -> u32 {
    static LIMIT: OnceLock<u32> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        std::env::var("RATE_LIMIT_CANCEL_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    })
}

/// Get configurable portal rate limit per minute
fn get_portal_rate_limit() -> u32 {
    static LIMIT: OnceLock<u32> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        std::env::var("RATE_LIMIT_PORTAL_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5)
    })
}

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
    pub retry_after_seconds: Option<u32>,
}

/// Per-key counting window. The window opens on the first request and
/// closes `window` later; the first request after expiry opens a fresh one.
struct Window {
    count: u32,
    reset_at: OffsetDateTime,
}

/// In-memory fixed-window rate limiter.
///
/// State is process-local; replicas each enforce their own budget. Shared
/// behind an `Arc` so every endpoint sees the same windows.
pub struct RateLimiter {
    windows: tokio::sync::RwLock<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Count a request against `key` and decide whether it may proceed.
    /// Denied requests do not consume budget.
    pub async fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitResult {
        let now = OffsetDateTime::now_utc();
        let mut windows = self.windows.write().await;

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count < max_requests {
            entry.count += 1;
            RateLimitResult {
                allowed: true,
                remaining: max_requests - entry.count,
                reset_at: entry.reset_at,
                retry_after_seconds: None,
            }
        } else {
            let retry_after = (entry.reset_at - now).whole_seconds().max(1) as u32;
            RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
                retry_after_seconds: Some(retry_after),
            }
        }
    }

    /// Check rate limit for subscription status checks
    /// Configurable via RATE_LIMIT_STATUS_PER_MINUTE (default: 20)
    pub async fn check_status(&self, identifier: &str) -> RateLimitResult {
        let key = format!("ratelimit:check-subscription:{}", identifier);
        self.check(&key, get_status_rate_limit(), DEFAULT_WINDOW)
            .await
    }

    /// Check rate limit for checkout session creation
    /// Configurable via RATE_LIMIT_CHECKOUT_PER_MINUTE (default: 5)
    pub async fn check_checkout(&self, identifier: &str) -> RateLimitResult {
        let key = format!("ratelimit:create-checkout:{}", identifier);
        self.check(&key, get_checkout_rate_limit(), DEFAULT_WINDOW)
            .await
    }

    /// Check rate limit for cancellation requests
    /// Configurable via RATE_LIMIT_CANCEL_PER_MINUTE (default: 3)
    pub async fn check_cancel(&self, identifier: &str) -> RateLimitResult {
        let key = format!("ratelimit:cancel-subscription:{}", identifier);
        self.check(&key, get_cancel_rate_limit(), DEFAULT_WINDOW)
            .await
    }

    /// Check rate limit for portal session creation
    /// Configurable via RATE_LIMIT_PORTAL_PER_MINUTE (default: 5)
    pub async fn check_portal(&self, identifier: &str) -> RateLimitResult {
        let key = format!("ratelimit:customer-portal:{}", identifier);
        self.check(&key, get_portal_rate_limit(), DEFAULT_WINDOW)
            .await
    }

    /// Drop expired windows (call periodically)
    pub async fn cleanup(&self) {
        let now = OffsetDateTime::now_utc();
        let mut windows = self.windows.write().await;
        windows.retain(|_, w| w.reset_at > now);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
