//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! guessing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::AuthFailure;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Sustained login attempts per second per IP.
pub const LOGIN_PER_SEC: u32 = 1;

/// Login attempts allowed back to back before throttling starts.
pub const LOGIN_BURST: u32 = 5;

/// Rate limiting configuration for the login endpoint.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    /// Key clients by `X-Forwarded-For` instead of the socket address.
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self::with_quota(trust_forwarded_for, LOGIN_PER_SEC, LOGIN_BURST)
    }

    pub fn with_quota(trust_forwarded_for: bool, per_second: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);

        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(per_second).allow_burst(burst),
            )),
            trust_forwarded_for,
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.trust_forwarded_for) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Rejecting login without client IP");
            return AuthFailure::new(StatusCode::FORBIDDEN, "Unable to determine client IP", false)
                .into_response();
        }
    };

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            AuthFailure::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please wait before trying again.",
                false,
            )
            .into_response()
        }
    }
}
