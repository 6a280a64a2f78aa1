//! §4.4.1 scheduled sweeps: a per-market task running once per second,
//! expiring GTD orders and re-evaluating stop/stop_limit triggers (ground:
//! standard tokio::time::interval background-task idiom, same shape as the
//! teacher's `RateLimiter`'s periodic cleanup task in `auth::rate_limit`).

use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::models::MarketId;
use crate::store::OrderStore;

use super::market_matcher::MarketMatcherHandle;

/// Ticks once a second and enqueues a `Sweep` command onto the market's own
/// actor queue (`market_matcher.rs`) rather than touching the engine
/// directly, so sweeps interleave with placements/cancels through the same
/// single logical thread of execution (spec §5).
pub async fn run(
    handle: MarketMatcherHandle,
    store: OrderStore,
    market_id: MarketId,
    shutdown: std::sync::Arc<Notify>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                handle.sweep(store.clone()).await;
            }
            _ = shutdown.notified() => {
                debug!(market_id = %market_id, "sweeper shutting down");
                break;
            }
        }
    }
}
