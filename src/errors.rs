//! Top-level error taxonomy (spec §7), converting component-leaf errors
//! (`LedgerError`, `MatchingError`, `StoreError`, `HubError`) into the wire
//! error codes of spec §6. Leaf enums use `thiserror`; `anyhow` is reserved
//! for the `main.rs` bootstrap boundary only, matching the teacher's split
//! between `services::matching::MatchingError` and `main`'s `anyhow::Result`.

use thiserror::Error;

use crate::hub::protocol::ErrorCode;
use crate::ledger::LedgerError;
use crate::matching::MatchingError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("risk resolver denied: {0}")]
    RiskDenied(String),

    #[error("market is halted or not accepting orders")]
    MarketHalted,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Maps to the wire error codes required by spec §6 / §7.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExchangeError::Validation(_) => ErrorCode::InvalidOrderData,
            ExchangeError::Ledger(LedgerError::InsufficientBalance { .. }) => {
                ErrorCode::OrderFailed
            }
            ExchangeError::Ledger(LedgerError::InsufficientLocked { .. }) => {
                ErrorCode::CancelFailed
            }
            ExchangeError::Matching(MatchingError::PostOnlyWouldCross) => {
                ErrorCode::OrderFailed
            }
            ExchangeError::Matching(MatchingError::FillOrKillUnfillable) => {
                ErrorCode::OrderFailed
            }
            ExchangeError::Matching(MatchingError::SelfTradePrevented) => {
                ErrorCode::OrderFailed
            }
            ExchangeError::Matching(MatchingError::OrderAlreadyTerminal) => {
                ErrorCode::CancelFailed
            }
            ExchangeError::Matching(MatchingError::EngineHalt) => ErrorCode::OrderFailed,
            ExchangeError::Matching(_) => ErrorCode::OrderFailed,
            ExchangeError::Store(_) => ErrorCode::OrderFailed,
            ExchangeError::RiskDenied(_) => ErrorCode::OrderFailed,
            ExchangeError::MarketHalted => ErrorCode::OrderFailed,
            ExchangeError::RateLimitExceeded => ErrorCode::RateLimitExceeded,
            ExchangeError::NotAuthenticated => ErrorCode::NotAuthenticated,
            ExchangeError::AuthFailed(_) => ErrorCode::AuthFailed,
            ExchangeError::Internal(_) => ErrorCode::OrderFailed,
        }
    }
}
