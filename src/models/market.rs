use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::MarketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Inactive,
    Maintenance,
    Delisted,
}

/// A trading pair and its validation/reference parameters.
///
/// `tick_size`/`lot_size` define the acceptance grid enforced by the matching
/// engine's acceptance gate; `last_price`/`high_24h`/`low_24h`/`volume_24h`
/// are a rolling cache maintained by the candle builder (C6), mirroring the
/// teacher's `Orderbook::last_trade_price` generalized to full 24h stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub min_order_size: Decimal,
    pub max_order_size: Option<Decimal>,
    pub min_notional: Decimal,
    pub max_notional: Option<Decimal>,
    pub status: MarketStatus,
    pub trading_enabled: bool,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub slippage_cap: Decimal,

    pub last_price: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub volume_24h: Decimal,
}

impl Market {
    pub fn is_tradable(&self) -> bool {
        self.status == MarketStatus::Active && self.trading_enabled
    }

    /// `price % tick_size == 0` acceptance-gate check (spec §4.4.2).
    pub fn price_on_grid(&self, price: Decimal) -> bool {
        self.tick_size != Decimal::ZERO && price % self.tick_size == Decimal::ZERO
    }

    /// `quantity % lot_size == 0` acceptance-gate check (spec §4.4.2).
    pub fn quantity_on_grid(&self, quantity: Decimal) -> bool {
        self.lot_size != Decimal::ZERO && quantity % self.lot_size == Decimal::ZERO
    }

    pub fn quantity_in_range(&self, quantity: Decimal) -> bool {
        if quantity < self.min_order_size {
            return false;
        }
        match self.max_order_size {
            Some(max) => quantity <= max,
            None => true,
        }
    }

    pub fn notional_in_range(&self, notional: Decimal) -> bool {
        if notional < self.min_notional {
            return false;
        }
        match self.max_notional {
            Some(max) => notional <= max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_market() -> Market {
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

    #[test]
    fn price_and_quantity_grid_checks() {
        let market = sample_market();
        assert!(market.price_on_grid(dec!(30000.00)));
        assert!(!market.price_on_grid(dec!(30000.001)));
        assert!(market.quantity_on_grid(dec!(0.5)));
        assert!(!market.quantity_on_grid(dec!(0.50005)));
    }

    #[test]
    fn notional_boundary_is_inclusive() {
        let market = sample_market();
        assert!(market.notional_in_range(dec!(10)));
        assert!(!market.notional_in_range(dec!(9.99)));
    }
}
