//! Balance Ledger (C2): per-`(user_id, asset)` available/locked totals with
//! atomic lock/unlock/credit/debitLocked/settleFill operations (spec §4.1).
//!
//! Sharded by `dashmap::DashMap` keyed on `(user_id, asset)`, each entry
//! guarded by its own `parking_lot::Mutex` so cross-user (and cross-asset)
//! operations parallelize while operations on the same key serialize,
//! matching the teacher's `dashmap` usage in `auth::rate_limit::RateLimiter`
//! and `services::matching::orderbook::Orderbook::order_index`.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Balance, Side, UserId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient available balance for user {user_id} asset {asset}: have {available}, need {needed}")]
    InsufficientBalance {
        user_id: UserId,
        asset: String,
        available: Decimal,
        needed: Decimal,
    },
    #[error("insufficient locked balance for user {user_id} asset {asset}: have {locked}, need {needed}")]
    InsufficientLocked {
        user_id: UserId,
        asset: String,
        locked: Decimal,
        needed: Decimal,
    },
}

type Key = (UserId, String);

/// Describes the net effect of a single fill on both sides of a trade,
/// resolved in one atomic pass across both users' rows (spec §4.1's
/// `settleFill`, §4.4 steps 2-3).
pub struct FillSettlement {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub base_asset: String,
    pub quote_asset: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub buyer_fee: Decimal,
    pub buyer_fee_asset: String,
    pub seller_fee: Decimal,
    pub seller_fee_asset: String,
}

#[derive(Debug, Default)]
struct Row {
    available: Decimal,
    locked: Decimal,
}

/// Balance Ledger. Cloneable handle sharing the underlying sharded map.
#[derive(Clone)]
pub struct BalanceLedger {
    rows: Arc<DashMap<Key, Mutex<Row>>>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
        }
    }

    fn with_row<R>(&self, user_id: UserId, asset: &str, f: impl FnOnce(&mut Row) -> R) -> R {
        let key = (user_id, asset.to_string());
        let guard = self.rows.entry(key).or_insert_with(|| Mutex::new(Row::default()));
        let mut row = guard.lock();
        f(&mut row)
    }

    pub fn available(&self, user_id: UserId, asset: &str) -> Decimal {
        self.with_row(user_id, asset, |row| row.available)
    }

    pub fn locked(&self, user_id: UserId, asset: &str) -> Decimal {
        self.with_row(user_id, asset, |row| row.locked)
    }

    pub fn snapshot(&self, user_id: UserId, asset: &str) -> Balance {
        let now = Utc::now();
        self.with_row(user_id, asset, |row| Balance {
            user_id,
            asset: asset.to_string(),
            available: row.available,
            locked: row.locked,
            created_at: now,
            updated_at: now,
        })
    }

    /// `lock(user, asset, amount)` → moves `amount` from `available` to
    /// `locked` (spec §4.1).
    pub fn lock(&self, user_id: UserId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        self.with_row(user_id, asset, |row| {
            if row.available < amount {
                return Err(LedgerError::InsufficientBalance {
                    user_id,
                    asset: asset.to_string(),
                    available: row.available,
                    needed: amount,
                });
            }
            row.available -= amount;
            row.locked += amount;
            Ok(())
        })?;
        debug!(%user_id, asset, %amount, "ledger lock");
        Ok(())
    }

    /// `unlock(user, asset, amount)` — reverse of `lock` (spec §4.1).
    pub fn unlock(&self, user_id: UserId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        self.with_row(user_id, asset, |row| {
            if row.locked < amount {
                return Err(LedgerError::InsufficientLocked {
                    user_id,
                    asset: asset.to_string(),
                    locked: row.locked,
                    needed: amount,
                });
            }
            row.locked -= amount;
            row.available += amount;
            Ok(())
        })?;
        debug!(%user_id, asset, %amount, "ledger unlock");
        Ok(())
    }

    /// `credit(user, asset, amount)` — increases `available` (spec §4.1).
    pub fn credit(&self, user_id: UserId, asset: &str, amount: Decimal) {
        self.with_row(user_id, asset, |row| row.available += amount);
        debug!(%user_id, asset, %amount, "ledger credit");
    }

    /// `debitLocked(user, asset, amount)` — decreases `locked`, consumed by a
    /// fill (spec §4.1).
    pub fn debit_locked(&self, user_id: UserId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        self.with_row(user_id, asset, |row| {
            if row.locked < amount {
                return Err(LedgerError::InsufficientLocked {
                    user_id,
                    asset: asset.to_string(),
                    locked: row.locked,
                    needed: amount,
                });
            }
            row.locked -= amount;
            Ok(())
        })?;
        debug!(%user_id, asset, %amount, "ledger debit_locked");
        Ok(())
    }

    /// Every `(asset, balance)` row held by a user, for the account-balances
    /// read path (REST `GET /account/balances`, hub `getOrders`-adjacent
    /// queries have no equivalent since balances aren't a subscription topic).
    pub fn all_for_user(&self, user_id: UserId) -> Vec<Balance> {
        let now = Utc::now();
        self.rows
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| {
                let row = entry.value().lock();
                Balance {
                    user_id,
                    asset: entry.key().1.clone(),
                    available: row.available,
                    locked: row.locked,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect()
    }

    /// Composite atomic settlement of one fill (spec §4.1, §4.4 steps 2-3).
    ///
    /// Buyer debits locked quote for `quantity*price`, credits base net of
    /// buyer fee. Seller debits locked base for `quantity`, credits quote net
    /// of seller fee. Fee currency direction follows SPEC_FULL §9: buyer pays
    /// in base, seller pays in quote, unless the caller supplies a different
    /// `*_fee_asset` (the Fee resolver's `fee_currency_preference`).
    ///
    /// On any partial failure, already-applied mutations for this call are
    /// rolled back before returning the error — no trade is left half
    /// settled (spec §4.4 "If any step fails, the whole transaction rolls
    /// back").
    pub fn settle_fill(&self, settlement: &FillSettlement) -> Result<(), LedgerError> {
        let notional = settlement.quantity * settlement.price;

        self.debit_locked(settlement.buyer_id, &settlement.quote_asset, notional)?;

        let buyer_base_credit = if settlement.buyer_fee_asset == settlement.base_asset {
            settlement.quantity - settlement.buyer_fee
        } else {
            settlement.quantity
        };
        self.credit(settlement.buyer_id, &settlement.base_asset, buyer_base_credit);
        if settlement.buyer_fee_asset != settlement.base_asset && settlement.buyer_fee > Decimal::ZERO {
            if let Err(err) = self.debit_locked(settlement.buyer_id, &settlement.buyer_fee_asset, settlement.buyer_fee) {
                warn!(?err, "buyer fee debit failed, rolling back settlement");
                self.credit(settlement.buyer_id, &settlement.quote_asset, notional);
                self.debit_locked(settlement.buyer_id, &settlement.base_asset, buyer_base_credit).ok();
                return Err(err);
            }
        }

        if let Err(err) = self.debit_locked(settlement.seller_id, &settlement.base_asset, settlement.quantity) {
            warn!(?err, "seller base debit failed, rolling back settlement");
            return Err(err);
        }
        let seller_quote_credit = if settlement.seller_fee_asset == settlement.quote_asset {
            notional - settlement.seller_fee
        } else {
            notional
        };
        self.credit(settlement.seller_id, &settlement.quote_asset, seller_quote_credit);

        Ok(())
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the asset locked/released for a given order side, used by the
/// acceptance gate and the sweeper's GTD-expiry unlock (spec §4.4.1).
pub fn locked_asset_for(side: Side, base_asset: &str, quote_asset: &str) -> String {
    match side {
        Side::Buy => quote_asset.to_string(),
        Side::Sell => base_asset.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lock_moves_available_to_locked() {
        let ledger = BalanceLedger::new();
        let user = UserId::new_v4();
        ledger.credit(user, "USDT", dec!(1000));
        ledger.lock(user, "USDT", dec!(400)).unwrap();
        assert_eq!(ledger.available(user, "USDT"), dec!(600));
        assert_eq!(ledger.locked(user, "USDT"), dec!(400));
    }

    #[test]
    fn lock_rejects_insufficient_available() {
        let ledger = BalanceLedger::new();
        let user = UserId::new_v4();
        ledger.credit(user, "USDT", dec!(100));
        let err = ledger.lock(user, "USDT", dec!(200));
        assert!(matches!(err, Err(LedgerError::InsufficientBalance { .. })));
    }

    #[test]
    fn unlock_reverses_lock() {
        let ledger = BalanceLedger::new();
        let user = UserId::new_v4();
        ledger.credit(user, "BTC", dec!(2));
        ledger.lock(user, "BTC", dec!(1)).unwrap();
        ledger.unlock(user, "BTC", dec!(1)).unwrap();
        assert_eq!(ledger.available(user, "BTC"), dec!(2));
        assert_eq!(ledger.locked(user, "BTC"), dec!(0));
    }

    #[test]
    fn settle_fill_matches_scenario_a() {
        // Scenario A from spec §8: 0.3 BTC @ 30000, maker_fee = taker_fee = 0.001.
        let ledger = BalanceLedger::new();
        let buyer = UserId::new_v4();
        let seller = UserId::new_v4();
        ledger.credit(buyer, "USDT", dec!(9000));
        ledger.lock(buyer, "USDT", dec!(9000)).unwrap();
        ledger.credit(seller, "BTC", dec!(0.5));
        ledger.lock(seller, "BTC", dec!(0.5)).unwrap();

        let settlement = FillSettlement {
            buyer_id: buyer,
            seller_id: seller,
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            quantity: dec!(0.3),
            price: dec!(30000),
            buyer_fee: dec!(0.0003), // 0.3 * 0.001 in BTC
            buyer_fee_asset: "BTC".into(),
            seller_fee: dec!(9), // 9000 * 0.001 in USDT
            seller_fee_asset: "USDT".into(),
        };
        ledger.settle_fill(&settlement).unwrap();

        assert_eq!(ledger.available(buyer, "BTC"), dec!(0.2997));
        assert_eq!(ledger.locked(buyer, "USDT"), dec!(0));
        assert_eq!(ledger.available(seller, "USDT"), dec!(8991));
        assert_eq!(ledger.locked(seller, "BTC"), dec!(0.2));
    }

    #[test]
    fn balance_invariant_never_negative_after_settlement() {
        let ledger = BalanceLedger::new();
        let user = UserId::new_v4();
        ledger.credit(user, "USDT", dec!(50));
        let balance = ledger.snapshot(user, "USDT");
        assert!(balance.invariant_holds());
    }
}
