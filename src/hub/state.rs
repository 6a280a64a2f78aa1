//! Shared state handed to every session task (ground: teacher's `AppState`
//! passed into `handle_socket`). Generic over the resolver types rather than
//! boxed trait objects, consistent with the rest of the matching stack.

use std::sync::Arc;

use dashmap::DashMap;

use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::ledger::BalanceLedger;
use crate::marketdata::MarketDataHub;
use crate::matching::{MarketMatcherHandle, MatchingEngine};
use crate::store::{OrderStore, TradeStore};

/// Everything a session needs for one market: the actor handle for mutating
/// operations and the engine itself for read-only snapshots/subscriptions.
pub struct MarketHandle<F: FeeResolver, R: RiskResolver> {
    pub matcher: MarketMatcherHandle,
    pub engine: MatchingEngine<F, R>,
}

impl<F: FeeResolver, R: RiskResolver> Clone for MarketHandle<F, R> {
    fn clone(&self) -> Self {
        Self { matcher: self.matcher.clone(), engine: self.engine.clone() }
    }
}

pub struct HubState<F: FeeResolver, R: RiskResolver, I: IdentityResolver> {
    pub markets: DashMap<String, MarketHandle<F, R>>,
    pub market_data: Arc<MarketDataHub>,
    pub store: OrderStore,
    pub trade_store: TradeStore,
    pub ledger: BalanceLedger,
    pub identity: Arc<I>,
}

impl<F: FeeResolver, R: RiskResolver, I: IdentityResolver> HubState<F, R, I> {
    pub fn new(
        market_data: Arc<MarketDataHub>,
        store: OrderStore,
        trade_store: TradeStore,
        ledger: BalanceLedger,
        identity: Arc<I>,
    ) -> Self {
        Self { markets: DashMap::new(), market_data, store, trade_store, ledger, identity }
    }

    pub fn register_market(&self, symbol: impl Into<String>, handle: MarketHandle<F, R>) {
        self.markets.insert(symbol.into(), handle);
    }

    pub fn market(&self, symbol: &str) -> Option<MarketHandle<F, R>> {
        self.markets.get(symbol).map(|entry| entry.value().clone())
    }
}
