//! Postgres-backed `OrderRepository`, grounded in the teacher's raw
//! `sqlx::query`/`query_as` usage with `ON CONFLICT` upsert idioms in
//! `services/matching/orchestrator.rs`.

use sqlx::{PgPool, Row};

use crate::models::{
    MarketId, Order, OrderId, OrderStatus, OrderType, SettlementStatus, Side, TimeInForce, Trade, TradeId, UserId,
};

use super::{OrderDiff, OrderFilters, OrderRepository, StoreError, TradeFilters, TradeRepository};

#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_order(row: sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let side_str: String = row.try_get("side").map_err(db_err)?;
    let type_str: String = row.try_get("order_type").map_err(db_err)?;
    let tif_str: String = row.try_get("time_in_force").map_err(db_err)?;
    let status_str: String = row.try_get("status").map_err(db_err)?;
    let stp_str: String = row.try_get("self_trade_prevention").map_err(db_err)?;

    Ok(Order {
        id: row.try_get("id").map_err(db_err)?,
        client_order_id: row.try_get("client_order_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        market_id: row.try_get("market_id").map_err(db_err)?,
        side: parse_side(&side_str)?,
        order_type: parse_order_type(&type_str)?,
        time_in_force: parse_tif(&tif_str)?,
        price: row.try_get("price").map_err(db_err)?,
        stop_price: row.try_get("stop_price").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        filled_quantity: row.try_get("filled_quantity").map_err(db_err)?,
        remaining_quantity: row.try_get("remaining_quantity").map_err(db_err)?,
        average_price: row.try_get("average_price").map_err(db_err)?,
        status: parse_status(&status_str)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
        post_only: row.try_get("post_only").map_err(db_err)?,
        reduce_only: row.try_get("reduce_only").map_err(db_err)?,
        self_trade_prevention: parse_stp(&stp_str)?,
        sequence: row.try_get("sequence").map_err(db_err)?,
        vip_level: row.try_get::<i16, _>("vip_level").map_err(db_err)? as u8,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn parse_side(s: &str) -> Result<Side, StoreError> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(StoreError::Database(format!("unknown side {other}"))),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, StoreError> {
    match s {
        "market" => Ok(OrderType::Market),
        "limit" => Ok(OrderType::Limit),
        "stop" => Ok(OrderType::Stop),
        "stop_limit" => Ok(OrderType::StopLimit),
        other => Err(StoreError::Database(format!("unknown order type {other}"))),
    }
}

fn parse_tif(s: &str) -> Result<TimeInForce, StoreError> {
    match s {
        "GTC" => Ok(TimeInForce::Gtc),
        "IOC" => Ok(TimeInForce::Ioc),
        "FOK" => Ok(TimeInForce::Fok),
        "GTD" => Ok(TimeInForce::Gtd),
        other => Err(StoreError::Database(format!("unknown time_in_force {other}"))),
    }
}

fn parse_status(s: &str) -> Result<OrderStatus, StoreError> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "open" => Ok(OrderStatus::Open),
        "partially_filled" => Ok(OrderStatus::PartiallyFilled),
        "filled" => Ok(OrderStatus::Filled),
        "cancelled" => Ok(OrderStatus::Cancelled),
        "rejected" => Ok(OrderStatus::Rejected),
        "expired" => Ok(OrderStatus::Expired),
        other => Err(StoreError::Database(format!("unknown status {other}"))),
    }
}

fn parse_stp(s: &str) -> Result<crate::models::SelfTradePreventionPolicy, StoreError> {
    use crate::models::SelfTradePreventionPolicy::*;
    match s {
        "none" => Ok(None),
        "expire_taker" => Ok(ExpireTaker),
        "expire_maker" => Ok(ExpireMaker),
        "expire_both" => Ok(ExpireBoth),
        other => Err(StoreError::Database(format!("unknown self_trade_prevention {other}"))),
    }
}

impl OrderRepository for PostgresOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, client_order_id, user_id, market_id, side, order_type, time_in_force,
                price, stop_price, quantity, filled_quantity, remaining_quantity,
                average_price, status, expires_at, post_only, reduce_only,
                self_trade_prevention, sequence, vip_level, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(&order.client_order_id)
        .bind(order.user_id)
        .bind(order.market_id)
        .bind(order.side.to_string())
        .bind(format!("{:?}", order.order_type).to_lowercase())
        .bind(match order.time_in_force {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
            TimeInForce::Gtd => "GTD",
        })
        .bind(order.price)
        .bind(order.stop_price)
        .bind(order.quantity)
        .bind(order.filled_quantity)
        .bind(order.remaining_quantity)
        .bind(order.average_price)
        .bind(format!("{:?}", order.status).to_lowercase())
        .bind(order.expires_at)
        .bind(order.post_only)
        .bind(order.reduce_only)
        .bind(format!("{:?}", order.self_trade_prevention).to_lowercase())
        .bind(order.sequence)
        .bind(order.vip_level as i16)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: OrderId,
        new_status: OrderStatus,
        diff: OrderDiff,
    ) -> Result<(), StoreError> {
        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let current_status = match current {
            Some(s) => parse_status(&s)?,
            None => return Err(StoreError::NotFound(id)),
        };
        if !current_status.can_transition_to(new_status) {
            return Err(StoreError::InvalidTransition {
                order_id: id,
                from: current_status,
                to: new_status,
            });
        }

        sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                filled_quantity = COALESCE($3, filled_quantity),
                remaining_quantity = COALESCE($4, remaining_quantity),
                average_price = COALESCE($5, average_price),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(format!("{:?}", new_status).to_lowercase())
        .bind(diff.filled_quantity)
        .bind(diff.remaining_quantity)
        .bind(diff.average_price)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(row_to_order).transpose()
    }

    async fn find_active(
        &self,
        market_id: MarketId,
        side: Option<Side>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE market_id = $1
              AND status NOT IN ('filled','cancelled','rejected','expired')
              AND ($2::text IS NULL OR side = $2)
            ORDER BY sequence ASC
            "#,
        )
        .bind(market_id)
        .bind(side.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        filters: OrderFilters,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE user_id = $1
              AND ($2::text IS NULL OR side = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY sequence DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(filters.side.map(|s| s.to_string()))
        .bind(filters.status.map(|s| format!("{:?}", s).to_lowercase()))
        .bind(filters.clamped_limit() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn find_by_client_order_id(
        &self,
        user_id: UserId,
        client_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE user_id = $1 AND client_order_id = $2")
            .bind(user_id)
            .bind(client_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(row_to_order).transpose()
    }
}

fn parse_settlement_status(s: &str) -> Result<SettlementStatus, StoreError> {
    match s {
        "pending" => Ok(SettlementStatus::Pending),
        "settled" => Ok(SettlementStatus::Settled),
        "failed" => Ok(SettlementStatus::Failed),
        other => Err(StoreError::Database(format!("unknown settlement_status {other}"))),
    }
}

fn row_to_trade(row: sqlx::postgres::PgRow) -> Result<Trade, StoreError> {
    let settlement_str: String = row.try_get("settlement_status").map_err(db_err)?;
    Ok(Trade {
        id: row.try_get("id").map_err(db_err)?,
        market_id: row.try_get("market_id").map_err(db_err)?,
        buyer_order_id: row.try_get("buyer_order_id").map_err(db_err)?,
        seller_order_id: row.try_get("seller_order_id").map_err(db_err)?,
        buyer_id: row.try_get("buyer_id").map_err(db_err)?,
        seller_id: row.try_get("seller_id").map_err(db_err)?,
        price: row.try_get("price").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        total: row.try_get("total").map_err(db_err)?,
        buyer_fee: row.try_get("buyer_fee").map_err(db_err)?,
        seller_fee: row.try_get("seller_fee").map_err(db_err)?,
        buyer_fee_asset: row.try_get("buyer_fee_asset").map_err(db_err)?,
        seller_fee_asset: row.try_get("seller_fee_asset").map_err(db_err)?,
        is_buyer_maker: row.try_get("is_buyer_maker").map_err(db_err)?,
        sequence: row.try_get("sequence").map_err(db_err)?,
        trade_time: row.try_get("trade_time").map_err(db_err)?,
        settlement_status: parse_settlement_status(&settlement_str)?,
    })
}

/// Postgres-backed `TradeRepository`, mirroring `PostgresOrderStore`'s raw
/// `sqlx::query`/`query_as` + `ON CONFLICT DO NOTHING` idiom.
#[derive(Clone)]
pub struct PostgresTradeStore {
    pool: PgPool,
}

impl PostgresTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TradeRepository for PostgresTradeStore {
    async fn create(&self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, market_id, buyer_order_id, seller_order_id, buyer_id, seller_id,
                price, quantity, total, buyer_fee, seller_fee, buyer_fee_asset,
                seller_fee_asset, is_buyer_maker, sequence, trade_time, settlement_status
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trade.id)
        .bind(trade.market_id)
        .bind(trade.buyer_order_id)
        .bind(trade.seller_order_id)
        .bind(trade.buyer_id)
        .bind(trade.seller_id)
        .bind(trade.price)
        .bind(trade.quantity)
        .bind(trade.total)
        .bind(trade.buyer_fee)
        .bind(trade.seller_fee)
        .bind(&trade.buyer_fee_asset)
        .bind(&trade.seller_fee_asset)
        .bind(trade.is_buyer_maker)
        .bind(trade.sequence)
        .bind(trade.trade_time)
        .bind(format!("{:?}", trade.settlement_status).to_lowercase())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_user(&self, user_id: UserId, filters: TradeFilters) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM trades
            WHERE (buyer_id = $1 OR seller_id = $1)
              AND ($2::uuid IS NULL OR market_id = $2)
            ORDER BY sequence DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(filters.market_id)
        .bind(filters.clamped_limit() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(row_to_trade).collect()
    }

    async fn find_by_id(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(row_to_trade).transpose()
    }
}

