//! Read-only market data REST handlers, the synchronous counterpart to the
//! hub's `getOrderBook`/`getTicker`/`getCandles` operations (ground:
//! teacher's `api::handlers::market::{get_orderbook, get_ticker}` and
//! `api::handlers::kline::get_candles`).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::hub::HubState;
use crate::hub::topics::parse_interval;
use crate::models::{Candle, OrderBookSnapshot};
use crate::marketdata::TickerSnapshot;
use crate::utils::response::AppError;

#[derive(Debug, Deserialize)]
pub struct OrderbookQuery {
    pub depth: Option<usize>,
}

pub async fn get_orderbook<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Path(symbol): Path<String>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<OrderBookSnapshot>, AppError>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let handle = state.market(&symbol).ok_or_else(|| AppError::not_found("unknown market"))?;
    let snapshot = handle.engine.book.snapshot(query.depth.unwrap_or(20));
    Ok(Json(snapshot))
}

pub async fn get_ticker<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Path(symbol): Path<String>,
) -> Result<Json<Option<TickerSnapshot>>, AppError>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let handle = state.market(&symbol).ok_or_else(|| AppError::not_found("unknown market"))?;
    Ok(Json(state.market_data.ticker(handle.engine.market_id())))
}

#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    pub interval: String,
    pub limit: Option<usize>,
}

pub async fn get_candles<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Path(symbol): Path<String>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<Vec<Candle>>, AppError>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let handle = state.market(&symbol).ok_or_else(|| AppError::not_found("unknown market"))?;
    let interval = parse_interval(&query.interval)
        .ok_or_else(|| AppError::bad_request("invalid interval"))?;
    let candles = state.market_data.candles(handle.engine.market_id(), interval, query.limit, None, None);
    Ok(Json(candles))
}
