use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{MarketId, OrderId, TradeId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Settled,
    Failed,
}

/// A single fill (spec §3). `sequence` is strictly increasing and gapless
/// within a market (spec §8 invariant 4). Fee duplication present in the
/// source (`buyer_commission`/`seller_commission` alongside `buyer_fee`/
/// `seller_fee`) is not reproduced here (SPEC_FULL §9 open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market_id: MarketId,
    pub buyer_order_id: OrderId,
    pub seller_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub total: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub buyer_fee_asset: String,
    pub seller_fee_asset: String,
    pub is_buyer_maker: bool,
    pub sequence: i64,
    pub trade_time: DateTime<Utc>,
    pub settlement_status: SettlementStatus,
}

impl Trade {
    pub fn total_for(price: Decimal, quantity: Decimal) -> Decimal {
        price * quantity
    }
}
