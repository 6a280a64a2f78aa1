//! Core data model (C1/C3): Market, Order, Trade, Balance and their derived
//! projections (OrderBookSnapshot, Candle). Plain data records with no I/O —
//! the persistence boundary lives in `crate::store` and `crate::ledger`.

pub mod balance;
pub mod candle;
pub mod ids;
pub mod market;
pub mod order;
pub mod orderbook;
pub mod trade;

pub use balance::Balance;
pub use candle::{Candle, Interval};
pub use ids::{MarketId, OrderId, SequenceCounter, TradeId, UserId};
pub use market::{Market, MarketStatus};
pub use order::{
    Order, OrderStatus, OrderType, PlaceOrderRequest, SelfTradePreventionPolicy, Side, TimeInForce,
};
pub use orderbook::{OrderBookSnapshot, PriceLevelView};
pub use trade::{SettlementStatus, Trade};

/// Millisecond-epoch serde helper for timestamps exchanged over the wire,
/// matching the teacher's `datetime_as_millis` convention in `models::order`.
pub mod millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(dt.timestamp_millis())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| serde::de::Error::custom("invalid millisecond timestamp"))
    }

    pub mod option {
        use chrono::{DateTime, TimeZone, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(
            dt: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(dt) => serializer.serialize_i64(dt.timestamp_millis()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<i64>::deserialize(deserializer)?;
            match millis {
                Some(millis) => Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom("invalid millisecond timestamp")),
                None => Ok(None),
            }
        }
    }
}
