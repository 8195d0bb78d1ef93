//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::{UNKNOWN_CLIENT_IP, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const SIGN_IN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const SIGN_IN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const SIGN_UP_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();
const RELAXED_PER_SEC: NonZeroU32 = NonZeroU32::new(1000).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Sign-in, email verification and refresh (5 burst, then 1 per second)
    pub sign_in: Arc<IpLimiter>,
    /// Sign-up and code re-sends (3 per minute)
    pub sign_up: Arc<IpLimiter>,
    /// Take the client IP from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with production limits.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            sign_in: Arc::new(RateLimiter::keyed(
                Quota::per_second(SIGN_IN_PER_SEC).allow_burst(SIGN_IN_BURST),
            )),
            sign_up: Arc::new(RateLimiter::keyed(Quota::per_minute(SIGN_UP_PER_MIN))),
            trust_forwarded_for,
        }
    }

    /// Limits high enough that tests never hit them.
    pub fn relaxed() -> Self {
        let quota = Quota::per_second(RELAXED_PER_SEC).allow_burst(RELAXED_PER_SEC);
        Self {
            sign_in: Arc::new(RateLimiter::keyed(quota)),
            sign_up: Arc::new(RateLimiter::keyed(quota)),
            trust_forwarded_for: false,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_forwarded_for)
            .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string())
    }
}

/// Middleware for rate limiting sign-in style endpoints.
pub async fn rate_limit_sign_in(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.sign_in.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(client_ip = %ip, "Sign-in rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many authentication attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting sign-up.
pub async fn rate_limit_sign_up(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.sign_up.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many signup attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}
