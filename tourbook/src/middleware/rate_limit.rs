//! Per-client rate limiting for the API surface
//!
//! An in-process keyed [`governor`] limiter; clients are identified by the
//! first `x-forwarded-for` address, else the peer address.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

/// Keyed limiter: `max_requests` per client per window
#[derive(Clone)]
pub struct ApiRateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    max_requests: u32,
}

impl ApiRateLimit {
    /// Build from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        let max = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(config.window() / max.get())
            .unwrap_or_else(|| Quota::per_second(max))
            .allow_burst(max);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            max_requests: max.get(),
        }
    }

    /// Count one request for `client`
    pub fn check(&self, client: &str) -> Result<()> {
        self.limiter
            .check_key(&client.to_string())
            .map_err(|_| Error::RateLimitExceeded)
    }

    /// Middleware function rejecting clients over their quota
    pub async fn middleware(State(limit): State<Self>, request: Request, next: Next) -> Result<Response> {
        let client = client_key(&request);
        if let Err(e) = limit.check(&client) {
            tracing::warn!(client = %client, limit = limit.max_requests, "Rate limit exceeded");
            return Err(e);
        }
        Ok(next.run(request).await)
    }
}

impl std::fmt::Debug for ApiRateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimit")
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
