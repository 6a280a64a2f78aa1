//! Rolling 24h ticker (spec §4.5): `last_price`, `bid`, `ask`, `volume_24h`,
//! `high_24h`, `low_24h`, `change_24h`, `change_percent_24h`, maintained from
//! the trade stream with second-granularity eviction of the 24h window.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::MarketId;

struct TradeSample {
    at: DateTime<Utc>,
    price: Decimal,
    quantity: Decimal,
}

/// Snapshot returned by `getTicker`/`getAllTickers` (spec §4.5). `bid`/`ask`
/// are populated by the caller from the live order book at query time —
/// this tracker only owns the trade-derived rolling-window fields.
#[derive(Debug, Clone, Serialize)]
pub struct TickerSnapshot {
    pub market_id: MarketId,
    pub last_price: Option<Decimal>,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub quote_volume_24h: Decimal,
    pub change_24h: Decimal,
    pub change_percent_24h: Decimal,
}

struct TickerState {
    samples: VecDeque<TradeSample>,
    last_sequence: Option<i64>,
}

pub struct TickerTracker {
    market_id: MarketId,
    state: Mutex<TickerState>,
}

impl TickerTracker {
    pub fn new(market_id: MarketId) -> Self {
        Self { market_id, state: Mutex::new(TickerState { samples: VecDeque::new(), last_sequence: None }) }
    }

    /// Folds one trade into the rolling window. Idempotent on `(market_id,
    /// sequence)`: a trade whose sequence is not strictly greater than the
    /// last one folded is skipped, mirroring `CandleBuilder::fold_trade`'s
    /// replay guard.
    pub fn record_trade(&self, price: Decimal, quantity: Decimal, at: DateTime<Utc>, sequence: i64) {
        let mut state = self.state.lock();
        if state.last_sequence.is_some_and(|last| sequence <= last) {
            return;
        }
        state.last_sequence = Some(sequence);
        state.samples.push_back(TradeSample { at, price, quantity });
        Self::evict_expired(&mut state.samples, at);
    }

    fn evict_expired(samples: &mut VecDeque<TradeSample>, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(24);
        while samples.front().is_some_and(|s| s.at < cutoff) {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TickerSnapshot {
        let mut state = self.state.lock();
        Self::evict_expired(&mut state.samples, now);
        let samples = &state.samples;

        if samples.is_empty() {
            return TickerSnapshot {
                market_id: self.market_id,
                last_price: None,
                high_24h: Decimal::ZERO,
                low_24h: Decimal::ZERO,
                volume_24h: Decimal::ZERO,
                quote_volume_24h: Decimal::ZERO,
                change_24h: Decimal::ZERO,
                change_percent_24h: Decimal::ZERO,
            };
        }

        let open_price = samples.front().unwrap().price;
        let last_price = samples.back().unwrap().price;
        let mut high = samples[0].price;
        let mut low = samples[0].price;
        let mut volume = Decimal::ZERO;
        let mut quote_volume = Decimal::ZERO;
        for sample in samples.iter() {
            high = high.max(sample.price);
            low = low.min(sample.price);
            volume += sample.quantity;
            quote_volume += sample.price * sample.quantity;
        }
        let change = last_price - open_price;
        let change_percent = if open_price.is_zero() {
            Decimal::ZERO
        } else {
            change / open_price * Decimal::from(100)
        };

        TickerSnapshot {
            market_id: self.market_id,
            last_price: Some(last_price),
            high_24h: high,
            low_24h: low,
            volume_24h: volume,
            quote_volume_24h: quote_volume,
            change_24h: change,
            change_percent_24h: change_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn tracks_high_low_and_change() {
        let market_id = uuid::Uuid::new_v4();
        let tracker = TickerTracker::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        tracker.record_trade(dec!(100), dec!(1), t0, 1);
        tracker.record_trade(dec!(110), dec!(2), t0 + Duration::minutes(5), 2);
        tracker.record_trade(dec!(90), dec!(1), t0 + Duration::minutes(10), 3);

        let snapshot = tracker.snapshot(t0 + Duration::minutes(10));
        assert_eq!(snapshot.last_price, Some(dec!(90)));
        assert_eq!(snapshot.high_24h, dec!(110));
        assert_eq!(snapshot.low_24h, dec!(90));
        assert_eq!(snapshot.volume_24h, dec!(4));
        assert_eq!(snapshot.change_24h, dec!(-10));
    }

    #[test]
    fn evicts_samples_older_than_24h() {
        let market_id = uuid::Uuid::new_v4();
        let tracker = TickerTracker::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        tracker.record_trade(dec!(100), dec!(1), t0, 1);
        let snapshot = tracker.snapshot(t0 + Duration::hours(25));
        assert!(snapshot.last_price.is_none());
        assert_eq!(snapshot.volume_24h, Decimal::ZERO);
    }

    #[test]
    fn ignores_replayed_sequence() {
        let market_id = uuid::Uuid::new_v4();
        let tracker = TickerTracker::new(market_id);
        let t0 = Utc.timestamp_opt(0, 0).single().unwrap();
        tracker.record_trade(dec!(100), dec!(1), t0, 5);
        tracker.record_trade(dec!(999), dec!(1), t0, 5);

        let snapshot = tracker.snapshot(t0);
        assert_eq!(snapshot.last_price, Some(dec!(100)));
        assert_eq!(snapshot.volume_24h, dec!(1));
    }
}
