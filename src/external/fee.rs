//! Fee resolver (spec §6): `rates(user_id, market_id, trade_type) ->
//! {maker_rate, taker_rate, fee_currency_preference}`.

use rust_decimal::Decimal;

use crate::models::MarketId;
use crate::models::UserId;

#[derive(Debug, Clone)]
pub struct FeeRates {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
    /// Resolves the open question on fee currency direction (SPEC_FULL §9):
    /// when `None`, the ledger defaults to "buyer pays in base, seller pays
    /// in quote".
    pub fee_currency_preference: Option<String>,
}

pub trait FeeResolver: Send + Sync {
    fn rates(
        &self,
        user_id: UserId,
        market_id: MarketId,
        vip_level: u8,
    ) -> impl std::future::Future<Output = FeeRates> + Send;
}

/// Flat-rate resolver backed by the market's own reference `maker_fee`/
/// `taker_fee` (spec §3 Market fields), ignoring VIP tiering — the simplest
/// resolver that satisfies the interface contract without external state.
#[derive(Clone)]
pub struct StaticFeeResolver {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeResolver for StaticFeeResolver {
    async fn rates(&self, _user_id: UserId, _market_id: MarketId, _vip_level: u8) -> FeeRates {
        FeeRates {
            maker_rate: self.maker_rate,
            taker_rate: self.taker_rate,
            fee_currency_preference: None,
        }
    }
}
