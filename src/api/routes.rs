//! `/api/v1` REST router: public market-data routes plus auth- and
//! rate-limit-gated trading routes (ground: teacher's `api::routes::
//! create_router` public/protected split).

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};

use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::hub::HubState;

use super::handlers;
use super::middleware::{auth_middleware, rate_limit_middleware, RateLimiter};

pub fn create_router<F, R, I>(state: Arc<HubState<F, R, I>>, rate_limiter: Arc<RateLimiter>) -> Router<Arc<HubState<F, R, I>>>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let public_routes = Router::new()
        .route("/markets/:symbol/orderbook", get(handlers::markets::get_orderbook::<F, R, I>))
        .route("/markets/:symbol/ticker", get(handlers::markets::get_ticker::<F, R, I>))
        .route("/markets/:symbol/candles", get(handlers::markets::get_candles::<F, R, I>));

    let protected_routes = Router::new()
        .route("/orders", post(handlers::orders::create_order::<F, R, I>))
        .route("/orders/:order_id", delete(handlers::orders::cancel_order::<F, R, I>))
        .route("/account/balances", get(handlers::account::get_balances::<F, R, I>))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware::<F, R, I>));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum_middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
}
