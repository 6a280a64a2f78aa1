//! Order Store (C3): canonical persistence of orders with status lifecycle
//! enforcement (spec §4.2). A repository trait with a Postgres-backed
//! implementation (ground: teacher's raw `sqlx::query`/`query_as` with
//! `ON CONFLICT DO NOTHING`/`DO UPDATE` upsert idioms in
//! `services/matching/orchestrator.rs`) and an in-memory implementation for
//! tests — the re-architected replacement for the source's ORM-instance-
//! method anti-pattern (spec §9).

pub mod memory;
pub mod postgres;

use thiserror::Error;

use crate::models::{MarketId, Order, OrderId, OrderStatus, Side, Trade, TradeId, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(OrderId),
    #[error("invalid status transition {from:?} -> {to:?} for order {order_id}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilters {
    pub side: Option<Side>,
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
}

impl OrderFilters {
    /// Clamped limit, mirroring the teacher's
    /// `TradeHistoryQuery::get_limit` `.min(100).max(1)` pattern.
    pub fn clamped_limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 100)
    }
}

/// Diffs applied by `updateStatus` (spec §4.2). Kept separate from `Order` so
/// the store can enforce that only status-lifecycle fields move through this
/// path, not arbitrary field writes.
#[derive(Debug, Clone, Default)]
pub struct OrderDiff {
    pub filled_quantity: Option<rust_decimal::Decimal>,
    pub remaining_quantity: Option<rust_decimal::Decimal>,
    pub average_price: Option<rust_decimal::Decimal>,
}

/// Native `async fn`-in-trait (no `async-trait` dependency, matching the
/// teacher's plain-struct-with-async-methods style). Used via static/enum
/// dispatch rather than `dyn`, since `OrderStore` below is the concrete
/// handle held by the rest of the crate.
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        id: OrderId,
        new_status: OrderStatus,
        diff: OrderDiff,
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_active(
        &self,
        market_id: MarketId,
        side: Option<Side>,
    ) -> Result<Vec<Order>, StoreError>;

    async fn find_by_user(
        &self,
        user_id: UserId,
        filters: OrderFilters,
    ) -> Result<Vec<Order>, StoreError>;

    /// `client_order_id` is unique per user; re-submission with a duplicate
    /// id returns the prior order idempotently (spec §4.2, §8 round-trip
    /// property).
    async fn find_by_client_order_id(
        &self,
        user_id: UserId,
        client_order_id: &str,
    ) -> Result<Option<Order>, StoreError>;
}

/// Concrete repository handle composed over either backend, so the rest of
/// the crate depends on one type rather than a trait object.
#[derive(Clone)]
pub enum OrderStore {
    Postgres(postgres::PostgresOrderStore),
    Memory(memory::InMemoryOrderStore),
}

impl OrderStore {
    pub async fn create(&self, order: &Order) -> Result<(), StoreError> {
        match self {
            OrderStore::Postgres(s) => s.create(order).await,
            OrderStore::Memory(s) => s.create(order).await,
        }
    }

    pub async fn update_status(
        &self,
        id: OrderId,
        new_status: OrderStatus,
        diff: OrderDiff,
    ) -> Result<(), StoreError> {
        match self {
            OrderStore::Postgres(s) => s.update_status(id, new_status, diff).await,
            OrderStore::Memory(s) => s.update_status(id, new_status, diff).await,
        }
    }

    pub async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        match self {
            OrderStore::Postgres(s) => s.find_by_id(id).await,
            OrderStore::Memory(s) => s.find_by_id(id).await,
        }
    }

    pub async fn find_active(
        &self,
        market_id: MarketId,
        side: Option<Side>,
    ) -> Result<Vec<Order>, StoreError> {
        match self {
            OrderStore::Postgres(s) => s.find_active(market_id, side).await,
            OrderStore::Memory(s) => s.find_active(market_id, side).await,
        }
    }

    pub async fn find_by_user(
        &self,
        user_id: UserId,
        filters: OrderFilters,
    ) -> Result<Vec<Order>, StoreError> {
        match self {
            OrderStore::Postgres(s) => s.find_by_user(user_id, filters).await,
            OrderStore::Memory(s) => s.find_by_user(user_id, filters).await,
        }
    }

    pub async fn find_by_client_order_id(
        &self,
        user_id: UserId,
        client_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        match self {
            OrderStore::Postgres(s) => s.find_by_client_order_id(user_id, client_order_id).await,
            OrderStore::Memory(s) => s.find_by_client_order_id(user_id, client_order_id).await,
        }
    }
}

/// Filters accepted by `getTrades` (spec §4.6), mirroring `OrderFilters`'
/// clamped-limit convention.
#[derive(Debug, Default, Clone)]
pub struct TradeFilters {
    pub market_id: Option<MarketId>,
    pub limit: Option<usize>,
}

impl TradeFilters {
    pub fn clamped_limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 100)
    }
}

/// Trade Store (C9 supplement, spec §4.6 `getTrades`): append-only fill
/// history keyed by the two counterparties of each trade, persisted
/// alongside order state so `getTrades` survives process restarts instead
/// of only reflecting the live broadcast (`hub::feeds::spawn_forwarder`'s
/// `TradesPrivate` branch covers the live side; this covers history).
pub trait TradeRepository: Send + Sync {
    async fn create(&self, trade: &Trade) -> Result<(), StoreError>;

    async fn find_by_user(&self, user_id: UserId, filters: TradeFilters) -> Result<Vec<Trade>, StoreError>;

    async fn find_by_id(&self, id: TradeId) -> Result<Option<Trade>, StoreError>;
}

#[derive(Clone)]
pub enum TradeStore {
    Postgres(postgres::PostgresTradeStore),
    Memory(memory::InMemoryTradeStore),
}

impl TradeStore {
    pub async fn create(&self, trade: &Trade) -> Result<(), StoreError> {
        match self {
            TradeStore::Postgres(s) => s.create(trade).await,
            TradeStore::Memory(s) => s.create(trade).await,
        }
    }

    pub async fn find_by_user(&self, user_id: UserId, filters: TradeFilters) -> Result<Vec<Trade>, StoreError> {
        match self {
            TradeStore::Postgres(s) => s.find_by_user(user_id, filters).await,
            TradeStore::Memory(s) => s.find_by_user(user_id, filters).await,
        }
    }

    pub async fn find_by_id(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        match self {
            TradeStore::Postgres(s) => s.find_by_id(id).await,
            TradeStore::Memory(s) => s.find_by_id(id).await,
        }
    }
}
