use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::MarketId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevelView {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Derived, read-only price-level view of a market's book (spec §3).
/// Produced by `crate::matching::orderbook::OrderBookAggregator::snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub market_id: MarketId,
    pub sequence_number: i64,
    pub bids: Vec<PriceLevelView>,
    pub asks: Vec<PriceLevelView>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub bid_depth: usize,
    pub ask_depth: usize,
}
