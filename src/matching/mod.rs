//! C4/C5: the matching engine and the order book it serializes access
//! through (spec §4.4, §4.5), plus the per-market actor queue and scheduled
//! sweep task that give the whole subsystem its concurrency shape (spec §5).

pub mod engine;
pub mod market_matcher;
pub mod orderbook;
pub mod sweeper;
pub mod types;

pub use engine::{MatchingEngine, TradeEvent, TradeEventWire};
pub use market_matcher::{spawn, Command, MarketMatcherHandle};
pub use orderbook::OrderBookAggregator;
pub use types::{FillOutcome, MatchingError, OrderBookEvent, PriceLevel, RestingOrder};
