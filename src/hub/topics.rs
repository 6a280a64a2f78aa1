//! Topic parsing and public/private classification (spec §4.6).

use crate::models::{Interval, UserId};

/// Maps a wire interval string (`"1m"`, `"4h"`, ...) to its `Interval`
/// variant, reusing the same short codes `Interval` itself serializes as.
pub fn parse_interval(s: &str) -> Option<Interval> {
    Interval::all().into_iter().find(|i| {
        matches!(
            (i, s),
            (Interval::OneMinute, "1m")
                | (Interval::FiveMinutes, "5m")
                | (Interval::FifteenMinutes, "15m")
                | (Interval::ThirtyMinutes, "30m")
                | (Interval::OneHour, "1h")
                | (Interval::FourHours, "4h")
                | (Interval::OneDay, "1d")
                | (Interval::OneWeek, "1w")
        )
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Ticker(String),
    Trades(String),
    Orderbook(String),
    Candles(String, String),
    OrdersPrivate(UserId),
    TradesPrivate(UserId),
}

impl Topic {
    pub fn is_private(&self) -> bool {
        matches!(self, Topic::OrdersPrivate(_) | Topic::TradesPrivate(_))
    }

    /// Parses a channel string such as `ticker:BTC/USDT`,
    /// `candles:BTC/USDT:1m`, or `orders:{user_id}`.
    pub fn parse(channel: &str) -> Option<Self> {
        let mut parts = channel.splitn(3, ':');
        let prefix = parts.next()?;
        let first = parts.next()?;
        match prefix {
            "ticker" => Some(Topic::Ticker(first.to_string())),
            "trades" => match first.parse::<UserId>() {
                Ok(user_id) => Some(Topic::TradesPrivate(user_id)),
                Err(_) => Some(Topic::Trades(first.to_string())),
            },
            "orderbook" => Some(Topic::Orderbook(first.to_string())),
            "candles" => {
                let interval = parts.next()?;
                Some(Topic::Candles(first.to_string(), interval.to_string()))
            }
            "orders" => first.parse::<UserId>().ok().map(Topic::OrdersPrivate),
            _ => None,
        }
    }

    pub fn channel(&self) -> String {
        match self {
            Topic::Ticker(symbol) => format!("ticker:{symbol}"),
            Topic::Trades(symbol) => format!("trades:{symbol}"),
            Topic::Orderbook(symbol) => format!("orderbook:{symbol}"),
            Topic::Candles(symbol, interval) => format!("candles:{symbol}:{interval}"),
            Topic::OrdersPrivate(user_id) => format!("orders:{user_id}"),
            Topic::TradesPrivate(user_id) => format!("trades:{user_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_public_topics() {
        assert_eq!(Topic::parse("ticker:BTC/USDT"), Some(Topic::Ticker("BTC/USDT".into())));
        assert_eq!(
            Topic::parse("candles:BTC/USDT:1m"),
            Some(Topic::Candles("BTC/USDT".into(), "1m".into()))
        );
        assert!(!Topic::parse("ticker:BTC/USDT").unwrap().is_private());
    }

    #[test]
    fn parses_private_topics() {
        let user_id = UserId::new_v4();
        let channel = format!("orders:{user_id}");
        let topic = Topic::parse(&channel).unwrap();
        assert_eq!(topic, Topic::OrdersPrivate(user_id));
        assert!(topic.is_private());
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert_eq!(Topic::parse("bogus:BTC/USDT"), None);
    }

    #[test]
    fn parses_known_interval_codes() {
        assert_eq!(parse_interval("1m"), Some(Interval::OneMinute));
        assert_eq!(parse_interval("4h"), Some(Interval::FourHours));
        assert_eq!(parse_interval("bogus"), None);
    }
}
