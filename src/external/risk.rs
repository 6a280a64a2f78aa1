//! Risk resolver (spec §6): `check(user_id, market_id, side, notional) ->
//! allow | deny(reason)`.

use rust_decimal::Decimal;

use crate::models::{MarketId, Side, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Allow,
    Deny(String),
}

pub trait RiskResolver: Send + Sync {
    fn check(
        &self,
        user_id: UserId,
        market_id: MarketId,
        side: Side,
        notional: Decimal,
    ) -> impl std::future::Future<Output = RiskDecision> + Send;
}

/// Always-allow resolver for tests and for deployments that defer risk
/// policy entirely to an out-of-process admin-authored ruleset (out of
/// scope per spec §1).
#[derive(Clone, Default)]
pub struct AllowAllRiskResolver;

impl RiskResolver for AllowAllRiskResolver {
    async fn check(&self, _user_id: UserId, _market_id: MarketId, _side: Side, _notional: Decimal) -> RiskDecision {
        RiskDecision::Allow
    }
}
