use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Per-`(user_id, asset)` ledger row (spec §3). Owned exclusively by
/// `crate::ledger`; every mutation goes through the ledger's atomic
/// operations, never direct field assignment from elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub asset: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn zero(user_id: UserId, asset: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            asset: asset.into(),
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// `available >= 0 && locked >= 0` (spec §8 invariant 2).
    pub fn invariant_holds(&self) -> bool {
        self.available >= Decimal::ZERO && self.locked >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub asset: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

impl From<&Balance> for BalanceResponse {
    fn from(balance: &Balance) -> Self {
        Self {
            asset: balance.asset.clone(),
            available: balance.available,
            locked: balance.locked,
            total: balance.total(),
        }
    }
}
