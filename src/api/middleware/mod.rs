pub mod auth;
pub mod metrics;
pub mod rate_limit;

pub use auth::auth_middleware;
pub use metrics::metrics_middleware;
pub use rate_limit::{rate_limit_middleware, RateLimiter, RateLimitConfig};
