//! Per-interval OHLCV candle builder (spec §4.5): for each supported
//! interval, folds trades into the current open bucket, retaining the most
//! recent N=1000 candles per `(market, interval)` in memory.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::models::{Candle, Interval, MarketId};

const RETAINED_CANDLES: usize = 1000;

pub struct CandleBuilder {
    market_id: MarketId,
    series: RwLock<Vec<VecDeque<Candle>>>,
}

impl CandleBuilder {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            series: RwLock::new(Interval::all().iter().map(|_| VecDeque::new()).collect()),
        }
    }

    fn index(interval: Interval) -> usize {
        Interval::all().iter().position(|i| *i == interval).expect("interval in Interval::all()")
    }

    /// Folds one trade into every interval's current bucket. Idempotent on
    /// `(market_id, sequence)`: a trade whose sequence was already folded
    /// into the open bucket for an interval is skipped for that interval.
    pub fn fold_trade(&self, price: Decimal, quantity: Decimal, is_buyer_maker: bool, trade_time: DateTime<Utc>, sequence: i64) {
        let mut series = self.series.write();
        for interval in Interval::all() {
            let idx = Self::index(interval);
            let bucket_open = interval.floor(trade_time);
            let deque = &mut series[idx];
            match deque.back_mut() {
                Some(candle) if candle.open_time == bucket_open => {
                    if sequence > candle.last_sequence {
                        candle.fold_trade(price, quantity, is_buyer_maker, sequence);
                    }
                }
                _ => {
                    let mut candle = Candle::open(self.market_id, interval, bucket_open, price);
                    candle.fold_trade(price, quantity, is_buyer_maker, sequence);
                    deque.push_back(candle);
                    if deque.len() > RETAINED_CANDLES {
                        deque.pop_front();
                    }
                }
            }
        }
    }

    /// `getCandles(market, interval, limit?, start?, end?)` (spec §4.5),
    /// most recent first trimmed to `limit`.
    pub fn query(
        &self,
        interval: Interval,
        limit: Option<usize>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<Candle> {
        let series = self.series.read();
        let idx = Self::index(interval);
        let mut matched: Vec<Candle> = series[idx]
            .iter()
            .filter(|c| start.map_or(true, |s| c.open_time >= s))
            .filter(|c| end.map_or(true, |e| c.open_time <= e))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            let drop = matched.len().saturating_sub(limit);
            matched.drain(0..drop);
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    #[test]
    fn folds_trade_into_new_bucket_then_updates_it() {
        let market_id = uuid::Uuid::new_v4();
        let builder = CandleBuilder::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        builder.fold_trade(dec!(100), dec!(1), false, t0, 1);
        builder.fold_trade(dec!(105), dec!(1), false, t0 + Duration::seconds(10), 2);

        let candles = builder.query(Interval::OneMinute, None, None, None);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].high, dec!(105));
        assert_eq!(candles[0].trades_count, 2);
    }

    #[test]
    fn is_idempotent_on_replayed_sequence() {
        let market_id = uuid::Uuid::new_v4();
        let builder = CandleBuilder::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        builder.fold_trade(dec!(100), dec!(1), false, t0, 5);
        builder.fold_trade(dec!(100), dec!(1), false, t0, 5);

        let candles = builder.query(Interval::OneMinute, None, None, None);
        assert_eq!(candles[0].trades_count, 1);
    }

    #[test]
    fn opens_new_bucket_across_interval_boundary() {
        let market_id = uuid::Uuid::new_v4();
        let builder = CandleBuilder::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        builder.fold_trade(dec!(100), dec!(1), false, t0, 1);
        builder.fold_trade(dec!(110), dec!(1), false, t0 + Duration::minutes(1), 2);

        let candles = builder.query(Interval::OneMinute, None, None, None);
        assert_eq!(candles.len(), 2);
    }

    #[test]
    fn limit_keeps_most_recent() {
        let market_id = uuid::Uuid::new_v4();
        let builder = CandleBuilder::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        for i in 0..5 {
            builder.fold_trade(dec!(100), dec!(1), false, t0 + Duration::minutes(i), i + 1);
        }
        let candles = builder.query(Interval::OneMinute, Some(2), None, None);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles.last().unwrap().open_time, t0 + Duration::minutes(4));
    }
}
