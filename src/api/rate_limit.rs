//! Per-client request throttling.
//!
//! Each (client IP, tier) pair holds a bucket of tokens that refills
//! continuously over the configured window. Register/login sit in a tighter
//! tier than the rest of the API to slow down password guessing.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Everything under /api except the auth endpoints
    Api,
    /// Register and login
    Auth,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_request: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            window_start: now,
            last_request: now,
        }
    }
}

/// Outcome of an admitted request, used for the X-RateLimit-* headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    pub fn capacity(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Take one token for `ip` in `tier`.
    /// Returns the remaining budget, or the number of seconds to wait.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        self.check_at(ip, tier, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, tier: RateLimitTier, now: Instant) -> Result<RateLimitInfo, u64> {
        let capacity = self.capacity(tier);
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                limit: capacity,
                remaining: capacity,
                reset_after: 0,
            });
        }

        let mut bucket = self
            .buckets
            .entry((ip, tier))
            .or_insert_with(|| Bucket::full(capacity, now));

        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window {
            *bucket = Bucket::full(capacity, now);
        } else {
            let idle = now.saturating_duration_since(bucket.last_request);
            let refill = (idle.as_secs_f64() * capacity as f64 / self.window.as_secs_f64()) as u32;
            bucket.tokens = bucket.tokens.saturating_add(refill).min(capacity);
        }
        bucket.last_request = now;

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(bucket.window_start))
            .as_secs();

        if bucket.tokens == 0 {
            return Err(reset_after.max(1));
        }

        bucket.tokens -= 1;
        Ok(RateLimitInfo {
            limit: capacity,
            remaining: bucket.tokens,
            reset_after,
        })
    }

    /// Drop buckets idle for more than two windows.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let ttl = self.window * 2;
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_request) < ttl);
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Client address: first X-Forwarded-For hop, then X-Real-IP, then the peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    forwarded
        .or_else(real_ip)
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, RateLimitTier::Auth).await
}

async fn throttle(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    match state.rate_limiter.check(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(info.remaining));
            headers.insert("x-ratelimit-reset", HeaderValue::from(info.reset_after));
            response
        }
        Err(retry_after) => {
            tracing::debug!(%ip, ?tier, retry_after, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert("retry-after", HeaderValue::from(retry_after));
            headers.insert(
                "x-ratelimit-limit",
                HeaderValue::from(state.rate_limiter.capacity(tier)),
            );
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            response
        }
    }
}

/// Periodically sweep stale buckets.
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                entries = rate_limiter.entry_count(),
                "Rate limiter cleanup complete"
            );
        }
    });
}
