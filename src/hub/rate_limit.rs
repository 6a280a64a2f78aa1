//! Per-session rate limiting (spec §4.6): ≤ 100 requests per rolling 60 s,
//! max 50 concurrent subscriptions. Sliding-window counter backed by a
//! plain `Mutex`, since each session owns exactly one limiter instance
//! (ground: teacher's `auth::rate_limit::RateLimiter`, generalized from
//! its shared-`DashMap`-by-client-id shape to one-limiter-per-session
//! since the hub already isolates sessions by task).

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);
const MAX_REQUESTS: u32 = 100;
pub const MAX_SUBSCRIPTIONS: usize = 50;

struct Window {
    count: u32,
    started_at: Instant,
}

pub struct SessionRateLimiter {
    window: Mutex<Window>,
}

impl Default for SessionRateLimiter {
    fn default() -> Self {
        Self { window: Mutex::new(Window { count: 0, started_at: Instant::now() }) }
    }
}

impl SessionRateLimiter {
    pub fn check(&self) -> bool {
        let mut window = self.window.lock();
        let now = Instant::now();
        if now.duration_since(window.started_at) >= WINDOW {
            window.count = 0;
            window.started_at = now;
        }
        window.count += 1;
        window.count <= MAX_REQUESTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = SessionRateLimiter::default();
        for _ in 0..MAX_REQUESTS {
            assert!(limiter.check());
        }
        assert!(!limiter.check());
    }
}
