//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password guessing.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::{IpExtractor, extract_client_ip};

/// Default signin/signup attempts per minute per client IP.
pub const DEFAULT_AUTH_PER_MINUTE: u32 = 20;

/// Tracked keys above which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Shared by signin and signup
    pub auth: Arc<IpLimiter>,
    /// Trusted proxy header; `None` keys on the socket address
    pub ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    /// Allow `per_minute` attempts per IP, refilled evenly over the minute.
    /// Zero is treated as one.
    pub fn per_minute(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            auth: Arc::new(RateLimiter::keyed(quota)),
            ip_extractor: None,
        }
    }

    pub fn with_ip_extractor(mut self, ip_extractor: Option<IpExtractor>) -> Self {
        self.ip_extractor = ip_extractor;
        self
    }

    /// Drop keys whose buckets have fully refilled once the store gets large.
    fn prune(&self) {
        if self.auth.len() > PRUNE_THRESHOLD {
            self.auth.retain_recent();
            self.auth.shrink_to_fit();
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(DEFAULT_AUTH_PER_MINUTE)
    }
}

/// Middleware for rate limiting signin and signup.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.ip_extractor.as_ref());

    let outcome = config.auth.check_key(&ip);
    config.prune();

    match outcome {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Auth rate limit exceeded");
            ApiError::too_many_requests("Too many attempts. Please try again later.")
                .into_response()
        }
    }
}
