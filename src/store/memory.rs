//! In-memory `OrderRepository` for tests, mirroring the shape of the
//! Postgres implementation without a database dependency.

use dashmap::DashMap;
use std::sync::Arc;

use crate::models::{MarketId, Order, OrderId, OrderStatus, Side, Trade, TradeId, UserId};

use super::{OrderDiff, OrderFilters, OrderRepository, StoreError, TradeFilters, TradeRepository};

#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<OrderId, Order>>,
    by_client_order_id: Arc<DashMap<(UserId, String), OrderId>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderRepository for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        if let Some(coid) = &order.client_order_id {
            self.by_client_order_id
                .entry((order.user_id, coid.clone()))
                .or_insert(order.id);
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: OrderId,
        new_status: OrderStatus,
        diff: OrderDiff,
    ) -> Result<(), StoreError> {
        let mut entry = self.orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !entry.status.can_transition_to(new_status) {
            return Err(StoreError::InvalidTransition {
                order_id: id,
                from: entry.status,
                to: new_status,
            });
        }
        if let Some(filled) = diff.filled_quantity {
            entry.filled_quantity = filled;
        }
        if let Some(remaining) = diff.remaining_quantity {
            entry.remaining_quantity = remaining;
        }
        if let Some(avg) = diff.average_price {
            entry.average_price = Some(avg);
        }
        entry.status = new_status;
        entry.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).map(|entry| entry.clone()))
    }

    async fn find_active(
        &self,
        market_id: MarketId,
        side: Option<Side>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                entry.market_id == market_id
                    && !entry.status.is_terminal()
                    && side.map(|s| s == entry.side).unwrap_or(true)
            })
            .map(|entry| entry.clone())
            .collect())
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        filters: OrderFilters,
    ) -> Result<Vec<Order>, StoreError> {
        let mut results: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                entry.user_id == user_id
                    && filters.side.map(|s| s == entry.side).unwrap_or(true)
                    && filters.status.map(|s| s == entry.status).unwrap_or(true)
            })
            .map(|entry| entry.clone())
            .collect();
        results.sort_by_key(|o| std::cmp::Reverse(o.sequence));
        results.truncate(filters.clamped_limit());
        Ok(results)
    }

    async fn find_by_client_order_id(
        &self,
        user_id: UserId,
        client_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let Some(id) = self
            .by_client_order_id
            .get(&(user_id, client_order_id.to_string()))
            .map(|e| *e)
        else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }
}

/// In-memory `TradeRepository` for tests, mirroring `InMemoryOrderStore`.
#[derive(Clone, Default)]
pub struct InMemoryTradeStore {
    trades: Arc<DashMap<TradeId, Trade>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeRepository for InMemoryTradeStore {
    async fn create(&self, trade: &Trade) -> Result<(), StoreError> {
        self.trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn find_by_user(&self, user_id: UserId, filters: TradeFilters) -> Result<Vec<Trade>, StoreError> {
        let mut results: Vec<Trade> = self
            .trades
            .iter()
            .filter(|entry| {
                (entry.buyer_id == user_id || entry.seller_id == user_id)
                    && filters.market_id.map(|m| m == entry.market_id).unwrap_or(true)
            })
            .map(|entry| entry.clone())
            .collect();
        results.sort_by_key(|t| std::cmp::Reverse(t.sequence));
        results.truncate(filters.clamped_limit());
        Ok(results)
    }

    async fn find_by_id(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        Ok(self.trades.get(&id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_order(user_id: UserId, market_id: MarketId) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            client_order_id: Some("coid-1".into()),
            user_id,
            market_id,
            side: Side::Buy,
            order_type: crate::models::OrderType::Limit,
            time_in_force: crate::models::TimeInForce::Gtc,
            price: Some(dec!(30000)),
            stop_price: None,
            quantity: dec!(1),
            filled_quantity: dec!(0),
            remaining_quantity: dec!(1),
            average_price: None,
            status: OrderStatus::Open,
            expires_at: None,
            post_only: false,
            reduce_only: false,
            self_trade_prevention: crate::models::SelfTradePreventionPolicy::None,
            sequence: 1,
            vip_level: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_client_order_id_returns_prior_order() {
        let store = InMemoryOrderStore::new();
        let user_id = Uuid::new_v4();
        let market_id = Uuid::new_v4();
        let order = sample_order(user_id, market_id);
        store.create(&order).await.unwrap();

        let found = store
            .find_by_client_order_id(user_id, "coid-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, order.id);
    }

    #[tokio::test]
    async fn invalid_transition_from_terminal_is_rejected() {
        let store = InMemoryOrderStore::new();
        let user_id = Uuid::new_v4();
        let market_id = Uuid::new_v4();
        let mut order = sample_order(user_id, market_id);
        order.status = OrderStatus::Cancelled;
        store.create(&order).await.unwrap();

        let result = store
            .update_status(order.id, OrderStatus::Filled, OrderDiff::default())
            .await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    fn sample_trade(buyer_id: UserId, seller_id: UserId, market_id: MarketId, sequence: i64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            market_id,
            buyer_order_id: Uuid::new_v4(),
            seller_order_id: Uuid::new_v4(),
            buyer_id,
            seller_id,
            price: dec!(30000),
            quantity: dec!(1),
            total: dec!(30000),
            buyer_fee: dec!(30),
            seller_fee: dec!(0.001),
            buyer_fee_asset: "USDT".into(),
            seller_fee_asset: "BTC".into(),
            is_buyer_maker: false,
            sequence,
            trade_time: Utc::now(),
            settlement_status: crate::models::SettlementStatus::Settled,
        }
    }

    #[tokio::test]
    async fn find_by_user_matches_either_counterparty_newest_first() {
        let store = InMemoryTradeStore::new();
        let buyer_id = Uuid::new_v4();
        let seller_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let market_id = Uuid::new_v4();
        store.create(&sample_trade(buyer_id, other_id, market_id, 1)).await.unwrap();
        store.create(&sample_trade(other_id, seller_id, market_id, 2)).await.unwrap();
        store.create(&sample_trade(other_id, other_id, market_id, 3)).await.unwrap();

        let seller_trades = store.find_by_user(seller_id, TradeFilters::default()).await.unwrap();
        assert_eq!(seller_trades.len(), 1);
        assert_eq!(seller_trades[0].sequence, 2);

        let buyer_trades = store.find_by_user(buyer_id, TradeFilters::default()).await.unwrap();
        assert_eq!(buyer_trades.len(), 1);
        assert_eq!(buyer_trades[0].sequence, 1);
    }
}
