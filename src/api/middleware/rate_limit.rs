//! Sliding-window REST rate limiter, 100 requests per 60s per client
//! (ground: teacher's `auth::rate_limit::RateLimiter`, same `DashMap`-by-
//! client-id shape and periodic-eviction background task, keyed here by
//! peer address since the REST surface has no session to own a limiter per
//! the hub's `SessionRateLimiter` instead).

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 100, window_secs: 60 }
    }
}

struct Entry {
    count: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    entries: DashMap<String, Entry>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        let limiter = Arc::new(Self { entries: DashMap::new(), config });

        let limiter_bg = Arc::clone(&limiter);
        tokio::spawn(async move {
            let window_secs = limiter_bg.config.window_secs;
            let mut interval = tokio::time::interval(Duration::from_secs(window_secs * 2));
            loop {
                interval.tick().await;
                let now = Instant::now();
                let window = Duration::from_secs(window_secs);
                limiter_bg.entries.retain(|_, entry| now.duration_since(entry.window_start) < window);
            }
        });

        limiter
    }

    fn check(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        let mut entry = self.entries.entry(client_id.to_string()).or_insert_with(|| Entry {
            count: 0,
            window_start: now,
        });
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
        entry.count <= self.config.max_requests
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !limiter.check(&addr.ip().to_string()) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}
