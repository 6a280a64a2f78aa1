//! Order placement/cancellation REST handlers, the synchronous counterpart
//! to the hub's `placeOrder`/`cancelOrder` operations (ground: teacher's
//! `api::handlers::order::{create_order, cancel_order}`, stripped of the
//! EIP-712 signature/margin checks that don't apply to a centralized
//! spot exchange's opaque-token auth).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::errors::ExchangeError;
use crate::external::identity::ResolvedUser;
use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::hub::HubState;
use crate::models::{Order, OrderId, PlaceOrderRequest};
use crate::utils::response::AppError;

pub async fn create_order<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Extension(user): Extension<ResolvedUser>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<Order>, AppError>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let handle = state
        .market(&request.symbol)
        .ok_or_else(|| AppError::bad_request("unknown market"))?;
    let (order, _trades) = handle
        .matcher
        .place_order(user.user_id, request, user.vip_level)
        .await
        .map_err(|e| AppError::from(ExchangeError::from(e)))?;
    Ok(Json(order))
}

pub async fn cancel_order<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Extension(_user): Extension<ResolvedUser>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let order = state
        .store
        .find_by_id(order_id)
        .await
        .map_err(|e| AppError::internal(&e.to_string()))?
        .ok_or_else(|| AppError::not_found("order not found"))?;
    let handle = state
        .markets
        .iter()
        .map(|entry| entry.value().clone())
        .find(|h| h.engine.market_id() == order.market_id)
        .ok_or_else(|| AppError::internal("market for order not registered"))?;
    let order = handle
        .matcher
        .cancel_order(order_id)
        .await
        .map_err(|e| AppError::from(ExchangeError::from(e)))?;
    Ok(Json(order))
}
