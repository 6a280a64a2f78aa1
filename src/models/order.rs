use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{MarketId, OrderId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
    #[serde(rename = "FOK")]
    Fok,
    #[serde(rename = "GTD")]
    Gtd,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTradePreventionPolicy {
    None,
    ExpireTaker,
    ExpireMaker,
    ExpireBoth,
}

impl Default for SelfTradePreventionPolicy {
    fn default() -> Self {
        SelfTradePreventionPolicy::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal states are immutable (spec §3 Order invariant).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Status transition graph enforced by the Order Store (spec §4.2, §4.4).
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Open)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Open, PartiallyFilled)
                | (Open, Filled)
                | (Open, Cancelled)
                | (Open, Expired)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
                | (PartiallyFilled, Expired)
        )
    }
}

/// Canonical order record (spec §3). `sequence` is assigned at acceptance by
/// the matching engine for deterministic price-time tie-breaking (SPEC_FULL
/// §3.1); `reduce_only` is carried per the data model but ignored by the spot
/// matcher (spec §1 non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_order_id: Option<String>,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub average_price: Option<Decimal>,
    pub status: OrderStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub self_trade_prevention: SelfTradePreventionPolicy,
    pub sequence: i64,
    pub vip_level: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// `filled_quantity + remaining_quantity == quantity` (spec §8 invariant 1).
    pub fn quantity_invariant_holds(&self) -> bool {
        self.filled_quantity + self.remaining_quantity == self.quantity
    }

    pub fn apply_fill(&mut self, fill_price: Decimal, fill_quantity: Decimal, now: DateTime<Utc>) {
        let prior_filled = self.filled_quantity;
        let new_filled = prior_filled + fill_quantity;
        self.average_price = Some(match self.average_price {
            Some(avg) if prior_filled > Decimal::ZERO => {
                (avg * prior_filled + fill_price * fill_quantity) / new_filled
            }
            _ => fill_price,
        });
        self.filled_quantity = new_filled;
        self.remaining_quantity = self.quantity - new_filled;
        self.status = if self.remaining_quantity == Decimal::ZERO {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = now;
    }
}

/// Inbound `placeOrder` payload (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub post_only: bool,
    #[serde(default)]
    pub self_trade_prevention: Option<SelfTradePreventionPolicy>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Explicit quote budget for market buys, resolving the open question on
    /// market-buy locking strategy (SPEC_FULL §9): when supplied, it takes
    /// precedence over the conservative `best_ask * qty * (1+slippage_cap)`
    /// upper bound.
    #[serde(default)]
    pub quote_budget: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn terminal_status_has_no_outgoing_transitions() {
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Open));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::PartiallyFilled));
    }

    #[test]
    fn open_to_partially_filled_to_filled_is_valid() {
        assert!(OrderStatus::Open.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn apply_fill_keeps_quantity_invariant_and_volume_weighted_average() {
        let now = Utc::now();
        let mut order = Order {
            id: uuid::Uuid::new_v4(),
            client_order_id: None,
            user_id: uuid::Uuid::new_v4(),
            market_id: uuid::Uuid::new_v4(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(dec!(30000)),
            stop_price: None,
            quantity: dec!(1.0),
            filled_quantity: Decimal::ZERO,
            remaining_quantity: dec!(1.0),
            average_price: None,
            status: OrderStatus::Open,
            expires_at: None,
            post_only: false,
            reduce_only: false,
            self_trade_prevention: SelfTradePreventionPolicy::None,
            sequence: 1,
            vip_level: 0,
            created_at: now,
            updated_at: now,
        };
        order.apply_fill(dec!(30000), dec!(0.3), now);
        assert!(order.quantity_invariant_holds());
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        order.apply_fill(dec!(30100), dec!(0.7), now);
        assert!(order.quantity_invariant_holds());
        assert_eq!(order.status, OrderStatus::Filled);
        // volume weighted: (30000*0.3 + 30100*0.7) / 1.0 = 30070
        assert_eq!(order.average_price, Some(dec!(30070)));
    }
}
