use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::MarketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub fn all() -> [Interval; 8] {
        use Interval::*;
        [
            OneMinute,
            FiveMinutes,
            FifteenMinutes,
            ThirtyMinutes,
            OneHour,
            FourHours,
            OneDay,
            OneWeek,
        ]
    }

    pub fn duration(self) -> Duration {
        use Interval::*;
        match self {
            OneMinute => Duration::minutes(1),
            FiveMinutes => Duration::minutes(5),
            FifteenMinutes => Duration::minutes(15),
            ThirtyMinutes => Duration::minutes(30),
            OneHour => Duration::hours(1),
            FourHours => Duration::hours(4),
            OneDay => Duration::days(1),
            OneWeek => Duration::weeks(1),
        }
    }

    /// `bucket_open_time = floor(trade_time, interval)` (spec §4.5).
    pub fn floor(self, trade_time: DateTime<Utc>) -> DateTime<Utc> {
        let width_secs = self.duration().num_seconds();
        let epoch_secs = trade_time.timestamp();
        let floored = (epoch_secs.div_euclid(width_secs)) * width_secs;
        Utc.timestamp_opt(floored, 0).single().unwrap_or(trade_time)
    }
}

/// Derived OHLCV bucket (spec §3). Retained bounded to N=1000 per
/// `(market, interval)` in-memory (SPEC_FULL §4.5), persisted for historical
/// queries via the same repository-trait pattern as the Order Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub market_id: MarketId,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades_count: u64,
    pub taker_buy_volume: Decimal,
    /// Highest trade `sequence` folded into this candle so far, used to make
    /// replay of `(market_id, sequence)` idempotent (spec §4.5).
    pub last_sequence: i64,
}

impl Candle {
    pub fn open(market_id: MarketId, interval: Interval, open_time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            market_id,
            interval,
            open_time,
            close_time: open_time + interval.duration(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            trades_count: 0,
            taker_buy_volume: Decimal::ZERO,
            last_sequence: 0,
        }
    }

    pub fn fold_trade(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        is_buyer_maker: bool,
        sequence: i64,
    ) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += quantity;
        self.quote_volume += price * quantity;
        self.trades_count += 1;
        if !is_buyer_maker {
            // taker is the buyer
            self.taker_buy_volume += quantity;
        }
        self.last_sequence = sequence;
    }

    pub fn ohlc_invariant_holds(&self) -> bool {
        self.high >= self.open.max(self.close) && self.open.min(self.close) >= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn floor_buckets_to_interval_boundary() {
        let t = Utc.timestamp_opt(125, 0).single().unwrap();
        let floored = Interval::OneMinute.floor(t);
        assert_eq!(floored.timestamp(), 120);
    }

    #[test]
    fn fold_trade_maintains_ohlc_invariant() {
        let market_id = uuid::Uuid::new_v4();
        let open_time = Utc.timestamp_opt(0, 0).single().unwrap();
        let mut candle = Candle::open(market_id, Interval::OneMinute, open_time, dec!(100));
        candle.fold_trade(dec!(105), dec!(1), false, 1);
        candle.fold_trade(dec!(95), dec!(1), true, 2);
        assert!(candle.ohlc_invariant_holds());
        assert_eq!(candle.high, dec!(105));
        assert_eq!(candle.low, dec!(95));
        assert_eq!(candle.close, dec!(95));
        assert_eq!(candle.trades_count, 2);
    }
}
