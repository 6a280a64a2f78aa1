//! Per-subscription forwarder tasks (spec §4.6): each `subscribe` spawns
//! one task (`TradesPrivate` spawns one per currently registered market)
//! that pushes onto the session's bounded mailbox until aborted on
//! unsubscribe/disconnect (ground: teacher's `handle_socket` broadcast
//! forwarding, generalized from a fixed set of receivers selected in one
//! `tokio::select!` to a dynamic per-topic task per session).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::matching::TradeEventWire;
use crate::store::OrderFilters;

use super::protocol::{ErrorCode, ServerPush};
use super::state::HubState;
use super::topics::Topic;

const ORDERBOOK_PUSH_DEPTH: usize = 20;
const PRIVATE_ORDERS_POLL: Duration = Duration::from_secs(3);

/// Non-blocking enqueue, mirroring `Session::push` (spec §4.6 "the hub
/// never blocks a publisher on a slow consumer").
fn push(out_tx: &mpsc::Sender<String>, message: impl serde::Serialize) {
    if let Ok(text) = serde_json::to_string(&message) {
        let _ = out_tx.try_send(text);
    }
}

pub fn spawn_forwarder<F, R, I>(
    topic: &Topic,
    state: &Arc<HubState<F, R, I>>,
    out_tx: mpsc::Sender<String>,
) -> Result<Vec<JoinHandle<()>>, ErrorCode>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    match topic {
        Topic::Ticker(symbol) => {
            let handle = state.market(symbol).ok_or(ErrorCode::InvalidChannel)?;
            let market_id = handle.engine.market_id();
            let market_data = state.market_data.clone();
            let mut trade_rx = handle.engine.subscribe_trades();
            let out_tx = out_tx.clone();
            Ok(vec![tokio::spawn(async move {
                loop {
                    match trade_rx.recv().await {
                        Ok(_) => {
                            if let Some(ticker) = market_data.ticker(market_id) {
                                push(&out_tx, ServerPush::new("ticker", json!(ticker)));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "ticker forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })])
        }
        Topic::Trades(symbol) => {
            let handle = state.market(symbol).ok_or(ErrorCode::InvalidChannel)?;
            let mut trade_rx = handle.engine.subscribe_trades();
            let out_tx = out_tx.clone();
            Ok(vec![tokio::spawn(async move {
                loop {
                    match trade_rx.recv().await {
                        Ok(event) => push(&out_tx, ServerPush::new("trade", json!(event.trade))),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "trade forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })])
        }
        Topic::Orderbook(symbol) => {
            let handle = state.market(symbol).ok_or(ErrorCode::InvalidChannel)?;
            let mut book_rx = handle.engine.subscribe_orderbook();
            let out_tx = out_tx.clone();
            Ok(vec![tokio::spawn(async move {
                loop {
                    match book_rx.recv().await {
                        // A fresh full snapshot per mutation rather than a
                        // true incremental diff: the gap-detection and
                        // resync contract (monotonic sequence_number, full
                        // snapshot on demand) holds either way.
                        Ok(event) => {
                            let snapshot = handle.engine.book.snapshot(ORDERBOOK_PUSH_DEPTH);
                            push(&out_tx, ServerPush::new("orderBook", json!({
                                "sequence_number": event.sequence_number(),
                                "snapshot": snapshot,
                            })));
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "orderbook forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })])
        }
        Topic::Candles(symbol, interval_code) => {
            let handle = state.market(symbol).ok_or(ErrorCode::InvalidChannel)?;
            let interval = super::topics::parse_interval(interval_code).ok_or(ErrorCode::InvalidChannel)?;
            let market_id = handle.engine.market_id();
            let market_data = state.market_data.clone();
            let mut trade_rx = handle.engine.subscribe_trades();
            let out_tx = out_tx.clone();
            Ok(vec![tokio::spawn(async move {
                loop {
                    match trade_rx.recv().await {
                        Ok(_) => {
                            let candles = market_data.candles(market_id, interval, Some(1), None, None);
                            if let Some(candle) = candles.into_iter().last() {
                                push(&out_tx, ServerPush::new("candle", json!(candle)));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "candle forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })])
        }
        Topic::OrdersPrivate(user_id) => {
            let user_id = *user_id;
            let store = state.store.clone();
            let out_tx = out_tx.clone();
            Ok(vec![tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PRIVATE_ORDERS_POLL);
                loop {
                    ticker.tick().await;
                    match store.find_by_user(user_id, OrderFilters::default()).await {
                        Ok(orders) => push(&out_tx, ServerPush::new("orders", json!(orders))),
                        Err(e) => warn!(error = %e, "orders forwarder poll failed"),
                    }
                }
            })])
        }
        Topic::TradesPrivate(user_id) => {
            let user_id = *user_id;
            let handles: Vec<_> = state.markets.iter().map(|entry| entry.value().clone()).collect();
            Ok(handles
                .into_iter()
                .map(|handle| {
                    let mut trade_rx: broadcast::Receiver<TradeEventWire> = handle.engine.subscribe_trades();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        loop {
                            match trade_rx.recv().await {
                                Ok(event) if event.trade.buyer_id == user_id || event.trade.seller_id == user_id => {
                                    push(&out_tx, ServerPush::new("trade", json!(event.trade)));
                                }
                                Ok(_) => {}
                                Err(broadcast::error::RecvError::Lagged(n)) => {
                                    warn!(skipped = n, "private trade forwarder lagged");
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    })
                })
                .collect())
        }
    }
}
