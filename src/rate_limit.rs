//! Rate limiting for login and registration.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Tracked clients above which fully refilled buckets are dropped.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
pub struct RateLimitConfig {
    /// Shared by login and register, so alternating between them gains nothing.
    pub credentials: Arc<IpLimiter>,
    /// Key on the proxy-appended `X-Forwarded-For` entry instead of the peer address.
    pub trust_forwarded_for: bool,
    max_tracked: usize,
}

impl RateLimitConfig {
    /// Allow `per_minute` attempts per IP, all of which may be used at once.
    pub fn new(per_minute: u32, trust_forwarded_for: bool) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            credentials: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            trust_forwarded_for,
            max_tracked: MAX_TRACKED_CLIENTS,
        }
    }

    /// Forget clients whose bucket has refilled, once too many are tracked.
    pub fn prune(&self) {
        if self.credentials.len() > self.max_tracked {
            self.credentials.retain_recent();
            self.credentials.shrink_to_fit();
        }
    }
}

/// Middleware for rate limiting login and registration.
pub async fn rate_limit_credentials(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.trust_forwarded_for) {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "Rejecting request without client IP");
            return ApiError::forbidden("Unable to determine client IP.").into_response();
        }
    };

    match config.credentials.check_key(&ip) {
        Ok(_) => {
            config.prune();
            next.run(request).await
        }
        Err(_) => {
            warn!(ip = %ip, "Credential rate limit exceeded");
            ApiError::too_many_requests("Too many attempts. Please wait before trying again.")
                .into_response()
        }
    }
}
