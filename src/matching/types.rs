//! Scaled-integer price levels and matching-internal types, grounded in the
//! teacher's `services::matching::types::PriceLevel` newtype, generalized
//! here to scale by the market's own `tick_size`/`price_precision` rather
//! than a hardcoded 1e8.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{MarketId, OrderId, Side, UserId};

/// Total-ordered scaled-integer price, so bids/asks can be stored in a
/// `BTreeMap` keyed by price. The scale is the market's `price_precision`
/// (decimal places), e.g. scale 2 turns `30000.01` into `3000001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceLevel(i64);

impl PriceLevel {
    pub fn from_decimal(price: Decimal, scale: u32) -> Self {
        let scaled = price * Decimal::from(10i64.pow(scale));
        PriceLevel(scaled.to_i64().unwrap_or(0))
    }

    pub fn to_decimal(self, scale: u32) -> Decimal {
        Decimal::new(self.0, scale)
    }
}

/// A resting order as held inside a single price-level queue, the minimal
/// projection of `Order` the matcher needs for FIFO consumption (ground:
/// teacher's `OrderEntry`).
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub price: Decimal,
    pub original_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub self_trade_prevention: crate::models::SelfTradePreventionPolicy,
    pub accepted_time: DateTime<Utc>,
    /// Acceptance-order tie-breaker per spec §4.4 ("Ties in price-time are
    /// broken by order id" — `sequence` additionally gives a total order
    /// that matches wall-clock acceptance, which `id` alone does not).
    pub sequence: i64,
    /// Snapshotted at acceptance so a maker's fee tier is resolved from the
    /// tier it held when it joined the book, not whatever tier it holds by
    /// the time a taker crosses it.
    pub vip_level: u8,
}

#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub maker_order_id: OrderId,
    pub maker_user_id: UserId,
    pub taker_order_id: OrderId,
    pub taker_user_id: UserId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buyer_maker: bool,
}

/// Event stream emitted by the order book aggregator on every mutation
/// (spec §4.3): `OrderOpened`, `OrderFilled(delta)`, `OrderCancelled`, each
/// advancing the per-market `sequence_number`.
#[derive(Debug, Clone)]
pub enum OrderBookEvent {
    OrderOpened {
        market_id: MarketId,
        sequence_number: i64,
    },
    OrderFilled {
        market_id: MarketId,
        sequence_number: i64,
    },
    OrderCancelled {
        market_id: MarketId,
        sequence_number: i64,
    },
}

impl OrderBookEvent {
    pub fn sequence_number(&self) -> i64 {
        match self {
            OrderBookEvent::OrderOpened { sequence_number, .. }
            | OrderBookEvent::OrderFilled { sequence_number, .. }
            | OrderBookEvent::OrderCancelled { sequence_number, .. } => *sequence_number,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchingError {
    #[error("market not found or not tradable")]
    MarketHalted,
    #[error("price is not aligned to tick_size")]
    InvalidPriceGrid,
    #[error("quantity is not aligned to lot_size")]
    InvalidQuantityGrid,
    #[error("quantity out of [min_order_size, max_order_size] range")]
    QuantityOutOfRange,
    #[error("notional out of [min_notional, max_notional] range")]
    NotionalOutOfRange,
    #[error("limit/stop_limit orders require a positive price")]
    InvalidPrice,
    #[error("market orders must not specify a price")]
    PriceMustBeNull,
    #[error("stop/stop_limit orders require a stop_price")]
    MissingStopPrice,
    #[error("order would immediately cross the book under post_only")]
    PostOnlyWouldCross,
    #[error("fill-or-kill order cannot be fully filled immediately")]
    FillOrKillUnfillable,
    #[error("self-trade prevention triggered")]
    SelfTradePrevented,
    #[error("order already in a terminal state")]
    OrderAlreadyTerminal,
    #[error("order not found")]
    OrderNotFound,
    #[error("insufficient liquidity to fill order")]
    InsufficientLiquidity,
    #[error("market buy requires a quote_budget")]
    MissingQuoteBudget,
    #[error("engine halted for this market, awaiting operator intervention")]
    EngineHalt,
    #[error("transient fault: {0}")]
    TransientFault(String),
}

pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_level_round_trips_through_scale() {
        let level = PriceLevel::from_decimal(dec!(30000.01), 2);
        assert_eq!(level.to_decimal(2), dec!(30000.01));
    }

    #[test]
    fn price_level_orders_numerically() {
        let low = PriceLevel::from_decimal(dec!(100.00), 2);
        let high = PriceLevel::from_decimal(dec!(100.01), 2);
        assert!(low < high);
    }
}
