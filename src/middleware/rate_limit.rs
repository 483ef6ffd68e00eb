//! Rate limiting middleware
//!
//! Per-IP limits for the unauthenticated routes (guest-token issuance and
//! identity-provider webhooks), built on governor.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;

/// Upper bound on tracked addresses before cleanup drops half of them
const MAX_TRACKED_IPS: usize = 10_000;

pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimitState {
    limiters: Arc<RwLock<HashMap<IpAddr, Arc<IpRateLimiter>>>>,
    quota: Quota,
}

impl RateLimitState {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(settings.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            quota,
        }
    }

    async fn get_limiter(&self, ip: IpAddr) -> Arc<IpRateLimiter> {
        {
            let limiters = self.limiters.read().await;
            if let Some(limiter) = limiters.get(&ip) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().await;
        limiters
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone()
    }

    /// Drop half of the tracked addresses once the map grows too large
    pub async fn cleanup(&self) {
        let mut limiters = self.limiters.write().await;
        if limiters.len() <= MAX_TRACKED_IPS {
            return;
        }

        let initial = limiters.len();
        let to_remove: Vec<_> = limiters.keys().take(initial / 2).cloned().collect();
        for ip in to_remove {
            limiters.remove(&ip);
        }
        debug!(before = initial, after = limiters.len(), "Rate limiter cleanup");
    }
}

/// Requests without a peer address (in-process calls) are not limited.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ip) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return next.run(request).await;
    };

    let limiter = rate_limit.get_limiter(ip).await;
    if limiter.check().is_err() {
        warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        return RateLimitExceeded.into_response();
    }

    next.run(request).await
}

pub struct RateLimitExceeded;

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "1"), ("X-RateLimit-Remaining", "0")],
            "Too many requests. Please try again later.",
        )
            .into_response()
    }
}

/// Periodically trim the limiter map
pub fn spawn_rate_limit_cleanup(state: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state.cleanup().await;
        }
    });
}
