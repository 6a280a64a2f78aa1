//! Trade Stream & Candle Builder (C6, spec §4.5): a single process-wide
//! task consuming a merged stream of every market's trade broadcast,
//! maintaining rolling tickers and bounded candle series (ground: teacher's
//! `kline_service` plus the `tokio::spawn` loop over `subscribe_trades()`
//! wired in `main.rs`).

pub mod candles;
pub mod ticker;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::matching::TradeEventWire;
use crate::models::{Interval, MarketId};

pub use candles::CandleBuilder;
pub use ticker::{TickerSnapshot, TickerTracker};

pub struct MarketDataHub {
    tickers: DashMap<MarketId, Arc<TickerTracker>>,
    candles: DashMap<MarketId, Arc<CandleBuilder>>,
}

impl Default for MarketDataHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataHub {
    pub fn new() -> Self {
        Self { tickers: DashMap::new(), candles: DashMap::new() }
    }

    pub fn register_market(&self, market_id: MarketId) {
        self.tickers.entry(market_id).or_insert_with(|| Arc::new(TickerTracker::new(market_id)));
        self.candles.entry(market_id).or_insert_with(|| Arc::new(CandleBuilder::new(market_id)));
    }

    fn fold(&self, market_id: MarketId, event: &TradeEventWire) {
        let trade = &event.trade;
        if let Some(ticker) = self.tickers.get(&market_id) {
            ticker.record_trade(trade.price, trade.quantity, trade.trade_time, trade.sequence);
        }
        if let Some(candles) = self.candles.get(&market_id) {
            candles.fold_trade(trade.price, trade.quantity, trade.is_buyer_maker, trade.trade_time, trade.sequence);
        }
    }

    /// `getTicker(market)` (spec §4.5).
    pub fn ticker(&self, market_id: MarketId) -> Option<TickerSnapshot> {
        self.tickers.get(&market_id).map(|t| t.snapshot(chrono::Utc::now()))
    }

    /// `getAllTickers()` (spec §4.5).
    pub fn all_tickers(&self) -> Vec<TickerSnapshot> {
        let now = chrono::Utc::now();
        self.tickers.iter().map(|entry| entry.value().snapshot(now)).collect()
    }

    /// `getCandles(market, interval, limit?, start?, end?)` (spec §4.5).
    pub fn candles(
        &self,
        market_id: MarketId,
        interval: Interval,
        limit: Option<usize>,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Vec<crate::models::Candle> {
        self.candles
            .get(&market_id)
            .map(|c| c.query(interval, limit, start, end))
            .unwrap_or_default()
    }
}

/// Forwards one market's trade broadcast into the shared merge channel.
/// Spawned once per market at startup alongside its matcher (`main.rs`).
pub fn spawn_market_feed(
    market_id: MarketId,
    mut trade_rx: tokio::sync::broadcast::Receiver<TradeEventWire>,
    merged_tx: mpsc::Sender<(MarketId, TradeEventWire)>,
) {
    tokio::spawn(async move {
        loop {
            match trade_rx.recv().await {
                Ok(event) => {
                    if merged_tx.send((market_id, event)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(market_id = %market_id, skipped = n, "trade feed lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// The single process-wide aggregator task (spec §4.5 "a dedicated tokio
/// task per process, not per market").
pub async fn run(hub: Arc<MarketDataHub>, mut merged_rx: mpsc::Receiver<(MarketId, TradeEventWire)>) {
    while let Some((market_id, event)) = merged_rx.recv().await {
        hub.fold(market_id, &event);
    }
}
