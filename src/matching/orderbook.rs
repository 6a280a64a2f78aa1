//! Order Book Aggregator (C5): price-level view derived from active resting
//! orders (spec §4.3). Directly grounded in the teacher's
//! `services::matching::orderbook::Orderbook`: a `BTreeMap<PriceLevel,
//! VecDeque<RestingOrder>>` per side plus a `DashMap` order index for O(1)
//! cancel lookup, generalized to scale by the market's own `tick_size`
//! rather than a hardcoded 1e8.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::models::{MarketId, OrderBookSnapshot, OrderId, PriceLevelView, Side};

use super::types::{OrderBookEvent, PriceLevel, RestingOrder};

pub struct OrderBookAggregator {
    market_id: MarketId,
    scale: u32,
    bids: RwLock<BTreeMap<PriceLevel, VecDeque<RestingOrder>>>,
    asks: RwLock<BTreeMap<PriceLevel, VecDeque<RestingOrder>>>,
    order_index: DashMap<OrderId, (Side, PriceLevel)>,
    sequence: AtomicI64,
}

impl OrderBookAggregator {
    pub fn new(market_id: MarketId, price_precision: u32) -> Self {
        Self {
            market_id,
            scale: price_precision,
            bids: RwLock::new(BTreeMap::new()),
            asks: RwLock::new(BTreeMap::new()),
            order_index: DashMap::new(),
            sequence: AtomicI64::new(0),
        }
    }

    fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sequence_number(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn book_for(&self, side: Side) -> &RwLock<BTreeMap<PriceLevel, VecDeque<RestingOrder>>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Adds a (possibly partially-filled) order to the resting book.
    pub fn add_order(&self, order: RestingOrder) -> OrderBookEvent {
        let level = PriceLevel::from_decimal(order.price, self.scale);
        let side = order.side;
        self.order_index.insert(order.id, (side, level));
        self.book_for(side)
            .write()
            .entry(level)
            .or_insert_with(VecDeque::new)
            .push_back(order);
        OrderBookEvent::OrderOpened {
            market_id: self.market_id,
            sequence_number: self.next_sequence(),
        }
    }

    pub fn has_order(&self, order_id: OrderId) -> bool {
        self.order_index.contains_key(&order_id)
    }

    pub fn cancel_order(&self, order_id: OrderId) -> Option<OrderBookEvent> {
        let (side, level) = self.order_index.remove(&order_id)?.1;
        let book = self.book_for(side);
        let mut guard = book.write();
        if let Some(queue) = guard.get_mut(&level) {
            queue.retain(|o| o.id != order_id);
            if queue.is_empty() {
                guard.remove(&level);
            }
        }
        Some(OrderBookEvent::OrderCancelled {
            market_id: self.market_id,
            sequence_number: self.next_sequence(),
        })
    }

    /// Reduces the resting quantity of `order_id` by `quantity` (a partial
    /// fill observed by the book after the matcher consumes it), removing
    /// the entry entirely once exhausted.
    pub fn reduce_order(&self, order_id: OrderId, quantity: Decimal) -> OrderBookEvent {
        if let Some(entry) = self.order_index.get(&order_id) {
            let (side, level) = *entry;
            drop(entry);
            let book = self.book_for(side);
            let mut guard = book.write();
            if let Some(queue) = guard.get_mut(&level) {
                if let Some(resting) = queue.iter_mut().find(|o| o.id == order_id) {
                    resting.remaining_quantity -= quantity;
                    if resting.remaining_quantity <= Decimal::ZERO {
                        queue.retain(|o| o.id != order_id);
                        drop(guard);
                        self.order_index.remove(&order_id);
                    }
                } else if queue.is_empty() {
                    guard.remove(&level);
                }
            }
        }
        OrderBookEvent::OrderFilled {
            market_id: self.market_id,
            sequence_number: self.next_sequence(),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.read().keys().next_back().map(|l| l.to_decimal(self.scale))
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.read().keys().next().map(|l| l.to_decimal(self.scale))
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.read().len()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.read().len()
    }

    /// `getOrderBook(market, depth, aggregation?)` (spec §4.3). Aggregate at
    /// price P equals the sum of `remaining_quantity` of all open orders on
    /// that side at P (spec §8 invariant 5).
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        let bids: Vec<PriceLevelView> = self
            .bids
            .read()
            .iter()
            .rev()
            .take(depth)
            .map(|(level, queue)| PriceLevelView {
                price: level.to_decimal(self.scale),
                quantity: queue.iter().map(|o| o.remaining_quantity).sum(),
            })
            .collect();
        let asks: Vec<PriceLevelView> = self
            .asks
            .read()
            .iter()
            .take(depth)
            .map(|(level, queue)| PriceLevelView {
                price: level.to_decimal(self.scale),
                quantity: queue.iter().map(|o| o.remaining_quantity).sum(),
            })
            .collect();
        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);
        OrderBookSnapshot {
            market_id: self.market_id,
            sequence_number: self.sequence_number(),
            bid_depth: self.bid_depth(),
            ask_depth: self.ask_depth(),
            spread: match (best_ask, best_bid) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            },
            best_bid,
            best_ask,
            bids,
            asks,
        }
    }

    /// Snapshot of the opposite-side queue used by the matcher to walk price
    /// levels during a match pass, without holding the write lock for the
    /// whole operation (copies are cheap: `RestingOrder` is small).
    pub fn opposite_levels(&self, aggressor_side: Side) -> Vec<(PriceLevel, VecDeque<RestingOrder>)> {
        let opposite = self.book_for(aggressor_side.opposite());
        let guard = opposite.read();
        match aggressor_side {
            // buy aggressor walks asks ascending; sell aggressor walks bids descending
            Side::Buy => guard.iter().map(|(l, q)| (*l, q.clone())).collect(),
            Side::Sell => guard.iter().rev().map(|(l, q)| (*l, q.clone())).collect(),
        }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn price_level(&self, price: Decimal) -> PriceLevel {
        PriceLevel::from_decimal(price, self.scale)
    }

    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn resting(side: Side, price: Decimal, qty: Decimal, seq: i64) -> RestingOrder {
        RestingOrder {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            side,
            price,
            original_quantity: qty,
            remaining_quantity: qty,
            self_trade_prevention: crate::models::SelfTradePreventionPolicy::None,
            accepted_time: Utc::now(),
            sequence: seq,
            vip_level: 0,
        }
    }

    #[test]
    fn add_and_cancel_order() {
        let book = OrderBookAggregator::new(Uuid::new_v4(), 2);
        let order = resting(Side::Buy, dec!(100.00), dec!(1), 1);
        let id = order.id;
        book.add_order(order);
        assert!(book.has_order(id));
        assert_eq!(book.best_bid(), Some(dec!(100.00)));
        book.cancel_order(id);
        assert!(!book.has_order(id));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn best_bid_ask_and_spread() {
        let book = OrderBookAggregator::new(Uuid::new_v4(), 2);
        book.add_order(resting(Side::Buy, dec!(99.00), dec!(1), 1));
        book.add_order(resting(Side::Sell, dec!(101.00), dec!(1), 2));
        assert_eq!(book.best_bid(), Some(dec!(99.00)));
        assert_eq!(book.best_ask(), Some(dec!(101.00)));
        assert_eq!(book.spread(), Some(dec!(2.00)));
    }

    #[test]
    fn snapshot_aggregates_remaining_quantity_at_price() {
        let book = OrderBookAggregator::new(Uuid::new_v4(), 2);
        book.add_order(resting(Side::Buy, dec!(100.00), dec!(1), 1));
        book.add_order(resting(Side::Buy, dec!(100.00), dec!(2), 2));
        let snapshot = book.snapshot(10);
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.bids[0].quantity, dec!(3));
    }

    #[test]
    fn reduce_order_removes_when_exhausted() {
        let book = OrderBookAggregator::new(Uuid::new_v4(), 2);
        let order = resting(Side::Sell, dec!(100.00), dec!(1), 1);
        let id = order.id;
        book.add_order(order);
        book.reduce_order(id, dec!(1));
        assert!(!book.has_order(id));
    }
}
