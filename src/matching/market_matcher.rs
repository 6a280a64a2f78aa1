//! Per-market actor: a tokio task owning a `mpsc` command queue so
//! placements and cancels for one market interleave deterministically
//! (spec §5 "Cancel requests are serialized through the same per-market
//! queue as placements"). The explicit re-architecture of the source's
//! "event-emitter + async callback chain" into owned state + message
//! passing (spec §9), grounded in the teacher's `OrderFlowOrchestrator`
//! "decide fast in-memory, persist async" pattern generalized so the
//! decision itself is also queued per market.

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::external::{FeeResolver, RiskResolver};
use crate::models::{Order, OrderId, PlaceOrderRequest, Side, UserId};
use crate::store::OrderStore;

use super::engine::{MatchingEngine, TradeEvent};
use super::types::MatchingError;

pub enum Command {
    Place {
        user_id: UserId,
        request: PlaceOrderRequest,
        vip_level: u8,
        reply: oneshot::Sender<Result<(Order, Vec<TradeEvent>), MatchingError>>,
    },
    Cancel {
        order_id: OrderId,
        reply: oneshot::Sender<Result<Order, MatchingError>>,
    },
    /// §4.4.1 scheduled sweep, routed through the same queue as
    /// placements/cancels so it participates in the market's single
    /// logical thread of execution (spec §5).
    Sweep {
        store: OrderStore,
    },
}

#[derive(Clone)]
pub struct MarketMatcherHandle {
    tx: mpsc::Sender<Command>,
}

impl MarketMatcherHandle {
    pub async fn place_order(
        &self,
        user_id: UserId,
        request: PlaceOrderRequest,
        vip_level: u8,
    ) -> Result<(Order, Vec<TradeEvent>), MatchingError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Place { user_id, request, vip_level, reply })
            .await
            .map_err(|_| MatchingError::EngineHalt)?;
        rx.await.map_err(|_| MatchingError::EngineHalt)?
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, MatchingError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel { order_id, reply })
            .await
            .map_err(|_| MatchingError::EngineHalt)?;
        rx.await.map_err(|_| MatchingError::EngineHalt)?
    }

    /// Enqueues a sweep tick (dropped silently if the queue is full or the
    /// task has shut down — the next tick will catch up).
    pub async fn sweep(&self, store: OrderStore) {
        let _ = self.tx.try_send(Command::Sweep { store });
    }
}

/// Spawns the per-market command loop. Returns a cheap, cloneable handle;
/// the engine itself (needed by REST read paths, the sweeper, and the
/// candle builder) is returned alongside so those consumers can read
/// snapshots/subscribe to broadcasts without going through the queue —
/// only mutating operations (place/cancel) are serialized through it.
pub fn spawn<F, R>(engine: MatchingEngine<F, R>, queue_depth: usize) -> MarketMatcherHandle
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Command>(queue_depth);
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Place { user_id, request, vip_level, reply } => {
                    let result = engine.place_order(user_id, request, vip_level).await;
                    if reply.send(result).is_err() {
                        warn!("place_order caller dropped before reply");
                    }
                }
                Command::Cancel { order_id, reply } => {
                    let result = engine.cancel_order(order_id).await;
                    if reply.send(result).is_err() {
                        warn!("cancel_order caller dropped before reply");
                    }
                }
                Command::Sweep { store } => {
                    if engine.is_halted() {
                        continue;
                    }
                    for side in [Side::Buy, Side::Sell] {
                        if let Ok(active) = store.find_active(engine.market_id(), Some(side)).await {
                            engine.sweep_expired_gtd(&active).await;
                        }
                    }
                    engine.sweep_stop_triggers().await;
                }
            }
        }
    });
    MarketMatcherHandle { tx }
}
