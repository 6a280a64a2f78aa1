//! Identifier and sequence primitives (C1).

use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

pub type OrderId = Uuid;
pub type TradeId = Uuid;
pub type UserId = Uuid;
pub type MarketId = Uuid;

/// Monotonic, gapless per-market counter used for trade sequence numbers and
/// order-book diff sequence numbers (spec invariant: strictly increasing, no gaps).
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicI64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Returns the next sequence value starting from 1.
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_gapless_and_strictly_increasing() {
        let seq = SequenceCounter::new();
        let a = seq.next();
        let b = seq.next();
        let c = seq.next();
        assert_eq!((a, b, c), (1, 2, 3));
    }
}
