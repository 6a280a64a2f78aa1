//! Matching Engine (C4): per-market serial matcher producing Trades
//! (spec §4.4). Owns the market's `OrderBookAggregator` (C5), applies the
//! acceptance gate, price-time priority matching, order-type semantics,
//! self-trade prevention, fee computation and trade emission/settlement.
//!
//! Generic over the Fee/Risk resolvers (SPEC_FULL §4.7) rather than boxed
//! trait objects, matching the teacher's plain-struct-with-async-methods
//! style and keeping matching hot-path code monomorphized.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::external::{FeeRates, FeeResolver, RiskDecision, RiskResolver};
use crate::ledger::{locked_asset_for, BalanceLedger, FillSettlement};
use crate::models::{
    Market, Order, OrderId, OrderStatus, OrderType, PlaceOrderRequest, SelfTradePreventionPolicy,
    SequenceCounter, Side, TimeInForce, Trade, UserId,
};
use crate::store::{OrderDiff, OrderStore, TradeStore};

use super::orderbook::OrderBookAggregator;
use super::types::{new_id, FillOutcome, MatchingError, OrderBookEvent, RestingOrder};

/// A resting stop / stop_limit order awaiting trigger (spec §4.4 "stop").
#[derive(Debug, Clone)]
struct PendingStop {
    order: Order,
}

pub struct TradeEvent {
    pub trade: Trade,
    pub maker_order: Order,
    pub taker_order: Order,
}

/// One matcher per market. Cheap to clone (all fields are `Arc`/atomics) so
/// it can be shared between the actor task (`market_matcher.rs`), the REST
/// handlers, and the sweeper.
pub struct MatchingEngine<F: FeeResolver, R: RiskResolver> {
    pub market: Arc<RwLock<Market>>,
    pub book: Arc<OrderBookAggregator>,
    ledger: BalanceLedger,
    store: OrderStore,
    trade_store: TradeStore,
    trade_sequence: Arc<SequenceCounter>,
    order_sequence: Arc<SequenceCounter>,
    fee_resolver: Arc<F>,
    risk_resolver: Arc<R>,
    pending_stops: Arc<RwLock<VecDeque<PendingStop>>>,
    trade_tx: broadcast::Sender<TradeEventWire>,
    book_tx: broadcast::Sender<OrderBookEvent>,
    halted: Arc<AtomicBool>,
}

/// Wire-cloneable projection of `TradeEvent` for the broadcast channel
/// (ground: teacher's `broadcast::Sender<TradeEvent>` in
/// `services::matching::mod` / `main.rs`'s `subscribe_trades()`).
#[derive(Debug, Clone)]
pub struct TradeEventWire {
    pub trade: Trade,
}

impl<F: FeeResolver, R: RiskResolver> Clone for MatchingEngine<F, R> {
    fn clone(&self) -> Self {
        Self {
            market: self.market.clone(),
            book: self.book.clone(),
            ledger: self.ledger.clone(),
            store: self.store.clone(),
            trade_store: self.trade_store.clone(),
            trade_sequence: self.trade_sequence.clone(),
            order_sequence: self.order_sequence.clone(),
            fee_resolver: self.fee_resolver.clone(),
            risk_resolver: self.risk_resolver.clone(),
            pending_stops: self.pending_stops.clone(),
            trade_tx: self.trade_tx.clone(),
            book_tx: self.book_tx.clone(),
            halted: self.halted.clone(),
        }
    }
}

impl<F: FeeResolver, R: RiskResolver> MatchingEngine<F, R> {
    pub fn new(
        market: Market,
        ledger: BalanceLedger,
        store: OrderStore,
        trade_store: TradeStore,
        fee_resolver: Arc<F>,
        risk_resolver: Arc<R>,
    ) -> Self {
        let price_precision = market.price_precision;
        let market_id = market.id;
        let (trade_tx, _) = broadcast::channel(4096);
        let (book_tx, _) = broadcast::channel(4096);
        Self {
            market: Arc::new(RwLock::new(market)),
            book: Arc::new(OrderBookAggregator::new(market_id, price_precision)),
            ledger,
            store,
            trade_store,
            trade_sequence: Arc::new(SequenceCounter::new()),
            order_sequence: Arc::new(SequenceCounter::new()),
            fee_resolver,
            risk_resolver,
            pending_stops: Arc::new(RwLock::new(VecDeque::new())),
            trade_tx,
            book_tx,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeEventWire> {
        self.trade_tx.subscribe()
    }

    /// Order-book diff stream for C5/C7 consumers (SPEC_FULL §4.4,
    /// teacher's `subscribe_orderbook()` counterpart).
    pub fn subscribe_orderbook(&self) -> broadcast::Receiver<OrderBookEvent> {
        self.book_tx.subscribe()
    }

    fn emit_book_event(&self, event: Option<OrderBookEvent>) {
        if let Some(event) = event {
            let _ = self.book_tx.send(event);
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn market_id(&self) -> crate::models::MarketId {
        self.market.read().id
    }

    fn halt(&self, reason: &str) {
        self.halted.store(true, Ordering::SeqCst);
        error!(market = %self.market.read().symbol, reason, "engine halted");
    }

    fn last_price(&self) -> Option<Decimal> {
        self.market.read().last_price
    }

    /// Acceptance gate (spec §4.4). Returns the error kind on the first
    /// failing check; no side effects occur before this returns `Ok`.
    fn acceptance_gate(&self, req: &PlaceOrderRequest) -> Result<(), MatchingError> {
        let market = self.market.read();
        if !market.is_tradable() {
            return Err(MatchingError::MarketHalted);
        }
        match req.order_type {
            OrderType::Limit | OrderType::StopLimit => {
                let price = req.price.ok_or(MatchingError::InvalidPrice)?;
                if price <= Decimal::ZERO {
                    return Err(MatchingError::InvalidPrice);
                }
                if !market.price_on_grid(price) {
                    return Err(MatchingError::InvalidPriceGrid);
                }
            }
            OrderType::Market => {
                if req.price.is_some() {
                    return Err(MatchingError::PriceMustBeNull);
                }
            }
            OrderType::Stop => {}
        }
        if matches!(req.order_type, OrderType::Stop | OrderType::StopLimit) && req.stop_price.is_none() {
            return Err(MatchingError::MissingStopPrice);
        }
        if !market.quantity_on_grid(req.quantity) {
            return Err(MatchingError::InvalidQuantityGrid);
        }
        if !market.quantity_in_range(req.quantity) {
            return Err(MatchingError::QuantityOutOfRange);
        }
        if let Some(price) = req.price {
            let notional = price * req.quantity;
            if !market.notional_in_range(notional) {
                return Err(MatchingError::NotionalOutOfRange);
            }
        }
        Ok(())
    }

    /// Computes the quote amount to lock for a buy order (spec §4.4 point 5
    /// and SPEC_FULL §9's resolved open question): an explicit
    /// `quote_budget` takes precedence; otherwise a conservative upper bound
    /// `best_ask * quantity * (1 + slippage_cap)`, with `max_fee_rate`
    /// headroom added on top so the fee debit in `ledger::settle_fill` never
    /// outruns what was locked at acceptance.
    fn buy_lock_amount(&self, req: &PlaceOrderRequest, max_fee_rate: Decimal) -> Result<Decimal, MatchingError> {
        if let Some(price) = req.price {
            let notional = price * req.quantity;
            return Ok(notional + notional * max_fee_rate);
        }
        if let Some(budget) = req.quote_budget {
            return Ok(budget);
        }
        let market = self.market.read();
        let best_ask = self
            .book
            .best_ask()
            .or(market.last_price)
            .ok_or(MatchingError::MissingQuoteBudget)?;
        let notional = best_ask * req.quantity * (Decimal::ONE + market.slippage_cap);
        Ok(notional + notional * max_fee_rate)
    }

    /// Submits a new order through the full spec §4.4 pipeline: acceptance
    /// gate → risk check → balance lock → persistence → matching. Returns
    /// the canonical order plus any immediate trades (spec §6).
    pub async fn place_order(
        &self,
        user_id: UserId,
        req: PlaceOrderRequest,
        vip_level: u8,
    ) -> Result<(Order, Vec<TradeEvent>), MatchingError> {
        if self.is_halted() {
            return Err(MatchingError::EngineHalt);
        }

        if let Some(coid) = &req.client_order_id {
            if let Ok(Some(existing)) = self.store.find_by_client_order_id(user_id, coid).await {
                // Idempotent re-submission (spec §4.2, §8 round-trip property).
                return Ok((existing, vec![]));
            }
        }

        self.acceptance_gate(&req)?;

        let (market_id, base_asset, quote_asset) = {
            let market = self.market.read();
            (market.id, market.base_asset.clone(), market.quote_asset.clone())
        };

        // Resolved once per placement for the taker side (spec §4.4); the
        // maker side of each fill is resolved fresh in `settle_one_fill` from
        // the resting order's own snapshotted `vip_level`.
        let taker_rates = self.fee_resolver.rates(user_id, market_id, vip_level).await;

        let notional = req
            .price
            .map(|p| p * req.quantity)
            .or(self.last_price().map(|p| p * req.quantity))
            .unwrap_or(Decimal::ZERO);

        if let RiskDecision::Deny(reason) = self.risk_resolver.check(user_id, market_id, req.side, notional).await {
            return self.reject(user_id, market_id, req, OrderStatus::Rejected, Some(reason), vip_level).await;
        }

        if req.order_type == OrderType::Market && req.post_only {
            return Err(MatchingError::PostOnlyWouldCross);
        }

        let lock_asset = locked_asset_for(req.side, &base_asset, &quote_asset);
        let lock_amount = match req.side {
            Side::Buy => self.buy_lock_amount(&req, taker_rates.taker_rate)?,
            Side::Sell => req.quantity,
        };

        self.ledger
            .lock(user_id, &lock_asset, lock_amount)
            .map_err(|e| MatchingError::TransientFault(e.to_string()))?;

        let now = Utc::now();
        let mut order = Order {
            id: new_id(),
            client_order_id: req.client_order_id.clone(),
            user_id,
            market_id,
            side: req.side,
            order_type: req.order_type,
            time_in_force: req.time_in_force.unwrap_or_default(),
            price: req.price,
            stop_price: req.stop_price,
            quantity: req.quantity,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: req.quantity,
            average_price: None,
            status: OrderStatus::Pending,
            expires_at: req.expires_at,
            post_only: req.post_only,
            reduce_only: false,
            self_trade_prevention: req.self_trade_prevention.unwrap_or_default(),
            sequence: self.order_sequence.next(),
            vip_level,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.create(&order).await {
            self.ledger.unlock(user_id, &lock_asset, lock_amount).ok();
            return Err(MatchingError::TransientFault(e.to_string()));
        }

        if order.order_type == OrderType::Stop || order.order_type == OrderType::StopLimit {
            order.status = OrderStatus::Pending;
            self.persist_status(&order).await;
            self.pending_stops.write().push_back(PendingStop { order: order.clone() });
            info!(order_id = %order.id, "stop order pending trigger");
            return Ok((order, vec![]));
        }

        order.status = OrderStatus::Open;
        self.persist_status(&order).await;
        let result = self.match_order(&mut order, &taker_rates, Some(lock_amount)).await;
        self.persist_status(&order).await;
        let trades = result?;
        Ok((order, trades))
    }

    async fn reject(
        &self,
        user_id: UserId,
        market_id: crate::models::MarketId,
        req: PlaceOrderRequest,
        status: OrderStatus,
        reason: Option<String>,
        vip_level: u8,
    ) -> Result<(Order, Vec<TradeEvent>), MatchingError> {
        let now = Utc::now();
        let order = Order {
            id: new_id(),
            client_order_id: req.client_order_id,
            user_id,
            market_id,
            side: req.side,
            order_type: req.order_type,
            time_in_force: req.time_in_force.unwrap_or_default(),
            price: req.price,
            stop_price: req.stop_price,
            quantity: req.quantity,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: req.quantity,
            average_price: None,
            status,
            expires_at: req.expires_at,
            post_only: req.post_only,
            reduce_only: false,
            self_trade_prevention: req.self_trade_prevention.unwrap_or_default(),
            sequence: self.order_sequence.next(),
            vip_level,
            created_at: now,
            updated_at: now,
        };
        self.store.create(&order).await.ok();
        warn!(order_id = %order.id, ?reason, "order rejected");
        Ok((order, vec![]))
    }

    async fn persist_status(&self, order: &Order) {
        let diff = OrderDiff {
            filled_quantity: Some(order.filled_quantity),
            remaining_quantity: Some(order.remaining_quantity),
            average_price: order.average_price,
        };
        if let Err(e) = self.store.update_status(order.id, order.status, diff).await {
            warn!(order_id = %order.id, error = %e, "failed to persist order status");
        }
    }

    /// Core price-time priority matching loop (spec §4.4). Walks opposite
    /// price levels best-first, consuming resting quantity FIFO within a
    /// level, honoring time-in-force / post_only / self-trade-prevention
    /// semantics, then (for GTC/GTD residuals) rests the order on the book.
    async fn match_order(
        &self,
        order: &mut Order,
        taker_rates: &FeeRates,
        lock_amount: Option<Decimal>,
    ) -> Result<Vec<TradeEvent>, MatchingError> {
        let (base_asset, quote_asset) = {
            let market = self.market.read();
            (market.base_asset.clone(), market.quote_asset.clone())
        };

        if order.time_in_force == TimeInForce::Fok {
            if !self.can_fully_fill(order) {
                order.status = OrderStatus::Rejected;
                self.release_order_lock(order, &base_asset, &quote_asset, order.remaining_quantity);
                return Err(MatchingError::FillOrKillUnfillable);
            }
        }

        let limit_price = order.price;
        let mut trades = Vec::new();
        let levels = self.book.opposite_levels(order.side);

        'outer: for (level, queue) in levels {
            if order.remaining_quantity <= Decimal::ZERO {
                break;
            }
            let level_price = level.to_decimal(self.book.scale());
            if let Some(lp) = limit_price {
                let crosses = match order.side {
                    Side::Buy => level_price <= lp,
                    Side::Sell => level_price >= lp,
                };
                if !crosses {
                    break 'outer;
                }
            }

            for maker in queue.iter() {
                if order.remaining_quantity <= Decimal::ZERO {
                    break;
                }
                if maker.user_id == order.user_id {
                    match order.self_trade_prevention {
                        SelfTradePreventionPolicy::None => {}
                        SelfTradePreventionPolicy::ExpireTaker => {
                            order.status = OrderStatus::Cancelled;
                            break 'outer;
                        }
                        SelfTradePreventionPolicy::ExpireMaker => {
                            let event = self.book.cancel_order(maker.id);
                            self.emit_book_event(event);
                            self.release_resting_lock(maker, &base_asset, &quote_asset);
                            continue;
                        }
                        SelfTradePreventionPolicy::ExpireBoth => {
                            let event = self.book.cancel_order(maker.id);
                            self.emit_book_event(event);
                            self.release_resting_lock(maker, &base_asset, &quote_asset);
                            order.status = OrderStatus::Cancelled;
                            break 'outer;
                        }
                    }
                }

                let fill_quantity = order.remaining_quantity.min(maker.remaining_quantity);
                let fill_price = maker.price;

                let outcome = FillOutcome {
                    maker_order_id: maker.id,
                    maker_user_id: maker.user_id,
                    taker_order_id: order.id,
                    taker_user_id: order.user_id,
                    price: fill_price,
                    quantity: fill_quantity,
                    is_buyer_maker: maker.side == Side::Buy,
                };

                match self
                    .settle_one_fill(order, maker, &outcome, taker_rates, &base_asset, &quote_asset)
                    .await
                {
                    Ok(trade_event) => trades.push(trade_event),
                    Err(e) => {
                        self.halt("settlement failure during fill");
                        return Err(e);
                    }
                }
            }
        }

        if order.status == OrderStatus::Cancelled {
            // Self-trade prevention (ExpireTaker/ExpireBoth) cancelled the
            // taker mid-walk; release whatever of its lock the fills-so-far
            // didn't consume before it falls out of the TIF handling below.
            self.release_unconsumed_lock(order, lock_amount, &trades, &base_asset, &quote_asset);
            self.recompute_ticker(&trades);
            return Ok(trades);
        }

        let mut liquidity_exhausted = false;
        match order.time_in_force {
            TimeInForce::Ioc | TimeInForce::Fok => {
                // FOK either fully fills above or has already returned
                // FillOrKillUnfillable before this point; this branch is
                // reached in practice only for IOC residuals, which cancel
                // rather than reject (spec §4.4 "limit (IOC)").
                if order.remaining_quantity > Decimal::ZERO {
                    self.release_unconsumed_lock(order, lock_amount, &trades, &base_asset, &quote_asset);
                    order.status = if order.filled_quantity > Decimal::ZERO {
                        OrderStatus::Filled
                    } else {
                        OrderStatus::Cancelled
                    };
                    order.remaining_quantity = Decimal::ZERO;
                }
            }
            TimeInForce::Gtc | TimeInForce::Gtd => {
                if order.remaining_quantity > Decimal::ZERO && order.status != OrderStatus::Cancelled {
                    if order.order_type == OrderType::Market {
                        self.release_unconsumed_lock(order, lock_amount, &trades, &base_asset, &quote_asset);
                        if order.filled_quantity > Decimal::ZERO {
                            order.status = OrderStatus::Filled;
                        } else {
                            order.status = OrderStatus::Rejected;
                            liquidity_exhausted = true;
                        }
                        order.remaining_quantity = Decimal::ZERO;
                    } else {
                        let event = self.book.add_order(RestingOrder {
                            id: order.id,
                            user_id: order.user_id,
                            side: order.side,
                            price: order.price.expect("limit order has price"),
                            original_quantity: order.quantity,
                            remaining_quantity: order.remaining_quantity,
                            self_trade_prevention: order.self_trade_prevention,
                            accepted_time: order.created_at,
                            sequence: order.sequence,
                            vip_level: order.vip_level,
                        });
                        self.emit_book_event(Some(event));
                        order.status = if order.filled_quantity > Decimal::ZERO {
                            OrderStatus::PartiallyFilled
                        } else {
                            OrderStatus::Open
                        };
                    }
                }
            }
        }

        if order.status != OrderStatus::Cancelled
            && order.status != OrderStatus::Rejected
            && order.remaining_quantity == Decimal::ZERO
        {
            order.status = OrderStatus::Filled;
        }

        self.recompute_ticker(&trades);

        if liquidity_exhausted {
            return Err(MatchingError::InsufficientLiquidity);
        }
        Ok(trades)
    }

    fn can_fully_fill(&self, order: &Order) -> bool {
        let levels = self.book.opposite_levels(order.side);
        let mut remaining = order.remaining_quantity;
        for (level, queue) in levels {
            if remaining <= Decimal::ZERO {
                break;
            }
            let level_price = level.to_decimal(self.book.scale());
            if let Some(lp) = order.price {
                let crosses = match order.side {
                    Side::Buy => level_price <= lp,
                    Side::Sell => level_price >= lp,
                };
                if !crosses {
                    break;
                }
            }
            let available: Decimal = queue.iter().map(|o| o.remaining_quantity).sum();
            remaining -= available.min(remaining);
        }
        remaining <= Decimal::ZERO
    }

    fn release_order_lock(&self, order: &Order, base_asset: &str, quote_asset: &str, residual_quantity: Decimal) {
        let (asset, amount) = match order.side {
            Side::Buy => (quote_asset, order.price.unwrap_or_default() * residual_quantity),
            Side::Sell => (base_asset, residual_quantity),
        };
        if amount > Decimal::ZERO {
            self.ledger.unlock(order.user_id, asset, amount).ok();
        }
    }

    /// Unlocks whatever of `lock_amount` wasn't consumed by `trades`, using
    /// actual fill prices rather than the (possibly absent, for market
    /// orders) taker limit price — fills may clear at prices better than the
    /// taker's own limit.
    fn release_unconsumed_lock(
        &self,
        order: &Order,
        lock_amount: Option<Decimal>,
        trades: &[TradeEvent],
        base_asset: &str,
        quote_asset: &str,
    ) {
        let Some(total_locked) = lock_amount else { return };
        let consumed: Decimal = match order.side {
            Side::Buy => trades.iter().map(|t| t.trade.price * t.trade.quantity).sum(),
            Side::Sell => trades.iter().map(|t| t.trade.quantity).sum(),
        };
        let residual = total_locked - consumed;
        if residual > Decimal::ZERO {
            let asset = match order.side {
                Side::Buy => quote_asset,
                Side::Sell => base_asset,
            };
            self.ledger.unlock(order.user_id, asset, residual).ok();
        }
    }

    fn release_resting_lock(&self, maker: &RestingOrder, base_asset: &str, quote_asset: &str) {
        let (asset, amount) = match maker.side {
            Side::Buy => (quote_asset, maker.price * maker.remaining_quantity),
            Side::Sell => (base_asset, maker.remaining_quantity),
        };
        if amount > Decimal::ZERO {
            self.ledger.unlock(maker.user_id, asset, amount).ok();
        }
    }

    /// One fill's worth of trade emission and settlement, transactional per
    /// spec §4.4 "Trade emission and settlement": sequence assignment,
    /// ledger settlement, book reduction, order state updates, all-or-
    /// nothing. `maker`/`order` are updated in place.
    async fn settle_one_fill(
        &self,
        order: &mut Order,
        maker: &RestingOrder,
        outcome: &FillOutcome,
        taker_rates: &FeeRates,
        base_asset: &str,
        quote_asset: &str,
    ) -> Result<TradeEvent, MatchingError> {
        let (buyer_id, seller_id, buyer_order_id, seller_order_id) = if outcome.is_buyer_maker {
            (outcome.maker_user_id, outcome.taker_user_id, outcome.maker_order_id, outcome.taker_order_id)
        } else {
            (outcome.taker_user_id, outcome.maker_user_id, outcome.taker_order_id, outcome.maker_order_id)
        };

        // The maker's tier is resolved fresh here, keyed on the tier it held
        // when it joined the book (`RestingOrder::vip_level`), rather than
        // reusing the taker's resolved rates for both sides of the fill.
        let market_id = self.market.read().id;
        let maker_rates = self.fee_resolver.rates(maker.user_id, market_id, maker.vip_level).await;

        let notional = outcome.price * outcome.quantity;
        let maker_is_buyer = outcome.is_buyer_maker;
        let (buyer_fee_rate, buyer_fee_pref) = if maker_is_buyer {
            (maker_rates.maker_rate, maker_rates.fee_currency_preference.clone())
        } else {
            (taker_rates.taker_rate, taker_rates.fee_currency_preference.clone())
        };
        let (seller_fee_rate, seller_fee_pref) = if maker_is_buyer {
            (taker_rates.taker_rate, taker_rates.fee_currency_preference.clone())
        } else {
            (maker_rates.maker_rate, maker_rates.fee_currency_preference.clone())
        };

        let buyer_fee_asset = buyer_fee_pref.unwrap_or_else(|| base_asset.to_string());
        let seller_fee_asset = seller_fee_pref.unwrap_or_else(|| quote_asset.to_string());
        let buyer_fee = outcome.quantity * buyer_fee_rate;
        let seller_fee = notional * seller_fee_rate;

        let settlement = FillSettlement {
            buyer_id,
            seller_id,
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            quantity: outcome.quantity,
            price: outcome.price,
            buyer_fee,
            buyer_fee_asset: buyer_fee_asset.clone(),
            seller_fee,
            seller_fee_asset: seller_fee_asset.clone(),
        };

        self.ledger
            .settle_fill(&settlement)
            .map_err(|e| MatchingError::TransientFault(e.to_string()))?;

        let event = self.book.reduce_order(maker.id, outcome.quantity);
        self.emit_book_event(Some(event));

        let now = Utc::now();
        order.apply_fill(outcome.price, outcome.quantity, now);

        let mut maker_order = self
            .store
            .find_by_id(maker.id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| order.clone());
        maker_order.apply_fill(outcome.price, outcome.quantity, now);
        self.persist_status(&maker_order).await;

        let sequence = self.trade_sequence.next();
        let trade = Trade {
            id: new_id(),
            market_id: self.market.read().id,
            buyer_order_id,
            seller_order_id,
            buyer_id,
            seller_id,
            price: outcome.price,
            quantity: outcome.quantity,
            total: notional,
            buyer_fee,
            seller_fee,
            buyer_fee_asset,
            seller_fee_asset,
            is_buyer_maker: maker_is_buyer,
            sequence,
            trade_time: now,
            settlement_status: crate::models::SettlementStatus::Settled,
        };

        {
            let mut market = self.market.write();
            market.last_price = Some(outcome.price);
        }

        if let Err(e) = self.trade_store.create(&trade).await {
            warn!(trade_id = %trade.id, error = %e, "failed to persist trade");
        }

        self.trade_tx.send(TradeEventWire { trade: trade.clone() }).ok();

        Ok(TradeEvent {
            trade,
            maker_order,
            taker_order: order.clone(),
        })
    }

    fn recompute_ticker(&self, trades: &[TradeEvent]) {
        if trades.is_empty() {
            return;
        }
        let mut market = self.market.write();
        for event in trades {
            market.volume_24h += event.trade.quantity;
            market.high_24h = Some(market.high_24h.map_or(event.trade.price, |h| h.max(event.trade.price)));
            market.low_24h = Some(market.low_24h.map_or(event.trade.price, |l| l.min(event.trade.price)));
        }
    }

    /// Cancels a resting order. Serialized through the same per-market
    /// command queue as placements by the actor wrapper (spec §5 "Cancel
    /// requests are serialized through the same per-market queue as
    /// placements").
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, MatchingError> {
        let mut order = self
            .store
            .find_by_id(order_id)
            .await
            .map_err(|e| MatchingError::TransientFault(e.to_string()))?
            .ok_or(MatchingError::OrderNotFound)?;

        if order.status.is_terminal() {
            return Err(MatchingError::OrderAlreadyTerminal);
        }

        let (base_asset, quote_asset) = {
            let market = self.market.read();
            (market.base_asset.clone(), market.quote_asset.clone())
        };

        if self.book.has_order(order_id) {
            let event = self.book.cancel_order(order_id);
            self.emit_book_event(event);
        }
        self.release_order_lock(&order, &base_asset, &quote_asset, order.remaining_quantity);

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        self.persist_status(&order).await;
        Ok(order)
    }

    /// §4.4.1 scheduled sweep, part (a): expires GTD orders past
    /// `expires_at`, unlocking residual balance.
    pub async fn sweep_expired_gtd(&self, active_orders: &[Order]) {
        let now = Utc::now();
        for order in active_orders {
            if order.time_in_force != TimeInForce::Gtd {
                continue;
            }
            let Some(expires_at) = order.expires_at else { continue };
            if expires_at > now || order.status.is_terminal() {
                continue;
            }
            let (base_asset, quote_asset) = {
                let market = self.market.read();
                (market.base_asset.clone(), market.quote_asset.clone())
            };
            let event = self.book.cancel_order(order.id);
            self.emit_book_event(event);
            self.release_order_lock(order, &base_asset, &quote_asset, order.remaining_quantity);
            let mut expired = order.clone();
            expired.status = OrderStatus::Expired;
            expired.updated_at = now;
            self.persist_status(&expired).await;
            info!(order_id = %order.id, "GTD order expired by sweep");
        }
    }

    /// §4.4.1 scheduled sweep, part (b): re-evaluates resting stop /
    /// stop_limit orders against `last_price`, promoting those that trigger.
    pub async fn sweep_stop_triggers(&self) -> Vec<TradeEvent> {
        let Some(last_price) = self.last_price() else { return vec![] };
        let market_id = self.market.read().id;
        let mut triggered = Vec::new();
        {
            let mut pending = self.pending_stops.write();
            let mut remaining = VecDeque::new();
            while let Some(entry) = pending.pop_front() {
                let stop_price = entry.order.stop_price.unwrap_or_default();
                let crosses = match entry.order.side {
                    Side::Buy => last_price >= stop_price,
                    Side::Sell => last_price <= stop_price,
                };
                if crosses {
                    triggered.push(entry.order);
                } else {
                    remaining.push_back(entry);
                }
            }
            *pending = remaining;
        }

        let mut all_trades = Vec::new();
        for mut order in triggered {
            let taker_rates = self.fee_resolver.rates(order.user_id, market_id, order.vip_level).await;
            // Same quote-budget formula as `buy_lock_amount` at acceptance
            // time (spec §4.4 point 5) — the original lock amount isn't
            // separately retained on the order record, so a triggered stop
            // re-derives it from the order's own price/quantity. Sells always
            // lock the base quantity regardless of whether a limit price is
            // attached (stop_limit sells aren't quote-denominated).
            let lock_amount = match order.side {
                Side::Buy => {
                    let notional = match order.price {
                        Some(price) => price * order.quantity,
                        None => {
                            let market = self.market.read();
                            last_price * order.quantity * (Decimal::ONE + market.slippage_cap)
                        }
                    };
                    Some(notional + notional * taker_rates.taker_rate)
                }
                Side::Sell => Some(order.quantity),
            };
            order.order_type = if order.order_type == OrderType::StopLimit {
                OrderType::Limit
            } else {
                OrderType::Market
            };
            order.status = OrderStatus::Open;
            self.persist_status(&order).await;
            info!(order_id = %order.id, "stop order triggered");
            match self.match_order(&mut order, &taker_rates, lock_amount).await {
                Ok(trades) => {
                    self.persist_status(&order).await;
                    all_trades.extend(trades);
                }
                Err(e) => warn!(order_id = %order.id, error = ?e, "triggered stop order failed to match"),
            }
        }
        all_trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{AllowAllRiskResolver, StaticFeeResolver};
    use crate::models::MarketStatus;
    use crate::store::memory::{InMemoryOrderStore, InMemoryTradeStore};
    use crate::store::TradeStore;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_market() -> Market {
        Market {
            id: Uuid::new_v4(),
            symbol: "BTC/USDT".into(),
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            price_precision: 2,
            quantity_precision: 4,
            tick_size: dec!(0.01),
            lot_size: dec!(0.0001),
            min_order_size: dec!(0.0001),
            max_order_size: None,
            min_notional: dec!(10),
            max_notional: None,
            status: MarketStatus::Active,
            trading_enabled: true,
            maker_fee: dec!(0.001),
            taker_fee: dec!(0.001),
            slippage_cap: dec!(0.05),
            last_price: None,
            high_24h: None,
            low_24h: None,
            volume_24h: Decimal::ZERO,
        }
    }

    fn test_engine() -> (MatchingEngine<StaticFeeResolver, AllowAllRiskResolver>, BalanceLedger) {
        let ledger = BalanceLedger::new();
        let store = OrderStore::Memory(InMemoryOrderStore::new());
        let trade_store = TradeStore::Memory(InMemoryTradeStore::new());
        let fee_resolver = Arc::new(StaticFeeResolver { maker_rate: dec!(0.001), taker_rate: dec!(0.001) });
        let risk_resolver = Arc::new(AllowAllRiskResolver);
        let engine = MatchingEngine::new(test_market(), ledger.clone(), store, trade_store, fee_resolver, risk_resolver);
        (engine, ledger)
    }

    fn limit_request(side: Side, price: Decimal, quantity: Decimal, tif: TimeInForce) -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: "BTC/USDT".into(),
            side,
            order_type: OrderType::Limit,
            time_in_force: Some(tif),
            quantity,
            price: Some(price),
            stop_price: None,
            post_only: false,
            self_trade_prevention: None,
            client_order_id: None,
            expires_at: None,
            quote_budget: None,
        }
    }

    // Scenario B: book asks 0.2 @ 30000, 0.2 @ 30001; a buy FOK 0.5 @ 30001
    // cannot be fully filled (only 0.4 available) and must reject with zero
    // trades and zero balance change.
    #[tokio::test]
    async fn scenario_b_fok_unfillable_rejects_with_no_trades() {
        let (engine, ledger) = test_engine();
        let seller1 = Uuid::new_v4();
        let seller2 = Uuid::new_v4();
        let buyer = Uuid::new_v4();

        ledger.credit(seller1, "BTC", dec!(0.2));
        ledger.credit(seller2, "BTC", dec!(0.2));
        ledger.credit(buyer, "USDT", dec!(20000));

        engine.place_order(seller1, limit_request(Side::Sell, dec!(30000), dec!(0.2), TimeInForce::Gtc), 0).await.unwrap();
        engine.place_order(seller2, limit_request(Side::Sell, dec!(30001), dec!(0.2), TimeInForce::Gtc), 0).await.unwrap();

        let buyer_available_before = ledger.available(buyer, "USDT");
        let result = engine.place_order(buyer, limit_request(Side::Buy, dec!(30001), dec!(0.5), TimeInForce::Fok), 0).await;

        assert!(matches!(result, Err(MatchingError::FillOrKillUnfillable)));
        assert_eq!(ledger.available(buyer, "USDT"), buyer_available_before);
        assert_eq!(ledger.locked(buyer, "USDT"), dec!(0));
    }

    // Scenario C: U4 rests a sell 1.0 @ 30000, then places a buy limit 0.4 @
    // 30000 with expire_taker self-trade prevention against itself. Expected:
    // zero trades, the buy is cancelled, the resting sell is untouched, and
    // the buy's quote lock is fully released.
    #[tokio::test]
    async fn scenario_c_self_trade_prevention_expires_taker() {
        let (engine, ledger) = test_engine();
        let user = Uuid::new_v4();
        ledger.credit(user, "BTC", dec!(1.0));
        ledger.credit(user, "USDT", dec!(20000));

        let (sell_order, _) = engine.place_order(user, limit_request(Side::Sell, dec!(30000), dec!(1.0), TimeInForce::Gtc), 0).await.unwrap();

        let available_before = ledger.available(user, "USDT");
        let mut buy_req = limit_request(Side::Buy, dec!(30000), dec!(0.4), TimeInForce::Gtc);
        buy_req.self_trade_prevention = Some(SelfTradePreventionPolicy::ExpireTaker);
        let (buy_order, trades) = engine.place_order(user, buy_req, 0).await.unwrap();

        assert!(trades.is_empty());
        assert_eq!(buy_order.status, OrderStatus::Cancelled);
        assert_eq!(ledger.available(user, "USDT"), available_before);
        assert_eq!(ledger.locked(user, "USDT"), dec!(0));

        let resting = engine.store.find_by_id(sell_order.id).await.unwrap().unwrap();
        assert_eq!(resting.remaining_quantity, dec!(1.0));
        assert_eq!(resting.status, OrderStatus::Open);
    }

    // Scenario D: a stop-buy 0.1 at stop_price=30100 rests pending while
    // last_price=30000; once a trade prints at 30105 the scheduled sweep
    // promotes it to a market buy, which matches the resting ask and fills.
    #[tokio::test]
    async fn scenario_d_stop_order_triggers_on_sweep() {
        let (engine, ledger) = test_engine();
        let resting_seller = Uuid::new_v4();
        let crossing_buyer = Uuid::new_v4();
        let stop_user = Uuid::new_v4();
        let ask_seller = Uuid::new_v4();

        ledger.credit(resting_seller, "BTC", dec!(0.1));
        ledger.credit(crossing_buyer, "USDT", dec!(10000));
        ledger.credit(stop_user, "USDT", dec!(10000));
        ledger.credit(ask_seller, "BTC", dec!(0.2));

        // First trade establishes last_price = 30000.
        engine.place_order(resting_seller, limit_request(Side::Sell, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        let (_, trades) = engine.place_order(crossing_buyer, limit_request(Side::Buy, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(engine.market.read().last_price, Some(dec!(30000)));

        // Stop-buy rests pending; not yet matched, no trades.
        let stop_req = PlaceOrderRequest {
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Stop,
            time_in_force: Some(TimeInForce::Gtc),
            quantity: dec!(0.1),
            price: None,
            stop_price: Some(dec!(30100)),
            post_only: false,
            self_trade_prevention: None,
            client_order_id: None,
            expires_at: None,
            quote_budget: None,
        };
        let (stop_order, stop_trades) = engine.place_order(stop_user, stop_req, 0).await.unwrap();
        assert!(stop_trades.is_empty());
        assert_eq!(stop_order.status, OrderStatus::Pending);

        // A later trade prints at 30105, moving last_price past the stop.
        engine.place_order(ask_seller, limit_request(Side::Sell, dec!(30105), dec!(0.2), TimeInForce::Gtc), 0).await.unwrap();
        let (_, second_trade) = engine.place_order(crossing_buyer, limit_request(Side::Buy, dec!(30105), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        assert_eq!(second_trade.len(), 1);
        assert_eq!(engine.market.read().last_price, Some(dec!(30105)));

        let triggered_trades = engine.sweep_stop_triggers().await;
        assert_eq!(triggered_trades.len(), 1);
        assert_eq!(triggered_trades[0].trade.quantity, dec!(0.1));

        let filled_stop = engine.store.find_by_id(stop_order.id).await.unwrap().unwrap();
        assert_eq!(filled_stop.status, OrderStatus::Filled);
    }

    // Scenario E: U1 rests a sell 1.0 @ 30000. A market buy for 0.5 is
    // accepted first and matches, then U1's cancel is processed against the
    // residual 0.5 — mirroring the per-market queue's FIFO acceptance order
    // (spec §5): whichever command reaches the engine first is applied first.
    #[tokio::test]
    async fn scenario_e_cancel_after_partial_match_terminates_residual() {
        let (engine, ledger) = test_engine();
        let maker = Uuid::new_v4();
        let taker = Uuid::new_v4();
        ledger.credit(maker, "BTC", dec!(1.0));
        ledger.credit(taker, "USDT", dec!(20000));

        let (resting, _) = engine.place_order(maker, limit_request(Side::Sell, dec!(30000), dec!(1.0), TimeInForce::Gtc), 0).await.unwrap();

        let market_buy = PlaceOrderRequest {
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            time_in_force: Some(TimeInForce::Ioc),
            quantity: dec!(0.5),
            price: None,
            stop_price: None,
            post_only: false,
            self_trade_prevention: None,
            client_order_id: None,
            expires_at: None,
            quote_budget: Some(dec!(15000)),
        };
        let (_, trades) = engine.place_order(taker, market_buy, 0).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade.quantity, dec!(0.5));

        let cancelled = engine.cancel_order(resting.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.remaining_quantity, dec!(0.5));
        assert_eq!(ledger.locked(maker, "BTC"), dec!(0));
        assert_eq!(ledger.available(maker, "BTC"), dec!(0.5));
    }

    // Round-trip property (spec §8): re-submitting the same client_order_id
    // returns the original order unchanged and locks no additional funds.
    #[tokio::test]
    async fn duplicate_client_order_id_is_idempotent() {
        let (engine, ledger) = test_engine();
        let user = Uuid::new_v4();
        ledger.credit(user, "USDT", dec!(20000));

        let mut req = limit_request(Side::Buy, dec!(30000), dec!(0.1), TimeInForce::Gtc);
        req.client_order_id = Some("my-coid".into());
        let (first, _) = engine.place_order(user, req.clone(), 0).await.unwrap();
        let locked_after_first = ledger.locked(user, "USDT");

        let (second, trades) = engine.place_order(user, req, 0).await.unwrap();
        assert_eq!(second.id, first.id);
        assert!(trades.is_empty());
        assert_eq!(ledger.locked(user, "USDT"), locked_after_first);
    }

    // Round-trip property (spec §8): cancelling an already-terminal order is
    // rejected rather than silently accepted.
    #[tokio::test]
    async fn cancel_of_filled_order_returns_already_terminal() {
        let (engine, ledger) = test_engine();
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        ledger.credit(seller, "BTC", dec!(0.1));
        ledger.credit(buyer, "USDT", dec!(10000));

        let (sell_order, _) = engine.place_order(seller, limit_request(Side::Sell, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        let (_, trades) = engine.place_order(buyer, limit_request(Side::Buy, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        assert_eq!(trades.len(), 1);

        let result = engine.cancel_order(sell_order.id).await;
        assert!(matches!(result, Err(MatchingError::OrderAlreadyTerminal)));
    }

    // Universal invariant 6 (spec §8): ties in price are broken by
    // acceptance order — the earliest resting order at a price level fills
    // before later ones.
    #[tokio::test]
    async fn price_time_priority_fills_earliest_resting_order_first() {
        let (engine, ledger) = test_engine();
        let first_seller = Uuid::new_v4();
        let second_seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        ledger.credit(first_seller, "BTC", dec!(0.1));
        ledger.credit(second_seller, "BTC", dec!(0.1));
        ledger.credit(buyer, "USDT", dec!(10000));

        let (first_order, _) = engine.place_order(first_seller, limit_request(Side::Sell, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        engine.place_order(second_seller, limit_request(Side::Sell, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();

        let (_, trades) = engine.place_order(buyer, limit_request(Side::Buy, dec!(30000), dec!(0.1), TimeInForce::Gtc), 0).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].maker_order.id, first_order.id);
    }
}
