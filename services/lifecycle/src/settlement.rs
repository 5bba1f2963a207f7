//! Settlement dispatcher: the on-chain transfer collaborator
//!
//! The core treats dispatch as fire-and-forget with eventual
//! confirmation. A trade is ledger-confirmed at match time and
//! chain-confirmed only when the collaborator reports success; a
//! permanent failure triggers the compensating reversal. Requests are
//! keyed by trade id so the collaborator can be retried safely after a
//! timeout without a double transfer.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::ids::{InstrumentId, TradeId, TraderId};
use types::numeric::{Price, Quantity};
use types::trade::Trade;

/// The transfer instruction handed to the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// Idempotency key: at most one chain transfer per trade id
    pub trade_id: TradeId,
    pub instrument_id: InstrumentId,
    pub buyer: TraderId,
    pub seller: TraderId,
    pub price: Price,
    pub quantity: Quantity,
    pub notional: Decimal,
}

impl From<&Trade> for SettlementRequest {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            instrument_id: trade.instrument_id.clone(),
            buyer: trade.buyer,
            seller: trade.seller,
            price: trade.price,
            quantity: trade.quantity,
            notional: trade.notional(),
        }
    }
}

/// Terminal outcome reported by the collaborator
///
/// Transient failures are the collaborator's retry concern and never
/// reach the core; only a permanent failure triggers reversal.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Confirmed,
    PermanentFailure { reason: String },
}

/// External collaborator contract for on-chain settlement
#[async_trait]
pub trait SettlementDispatcher: Send + Sync {
    async fn dispatch(&self, request: SettlementRequest) -> SettlementOutcome;
}

/// Dispatcher that immediately confirms every trade (demo/server default)
#[derive(Debug, Default)]
pub struct AutoConfirmDispatcher;

#[async_trait]
impl SettlementDispatcher for AutoConfirmDispatcher {
    async fn dispatch(&self, _request: SettlementRequest) -> SettlementOutcome {
        SettlementOutcome::Confirmed
    }
}

/// Recording test double with scriptable failures and an idempotency
/// guard: repeat dispatches for a trade id are answered consistently
/// but produce no second transfer.
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<SettlementRequest>>,
    transferred: Mutex<HashSet<TradeId>>,
    fail: Mutex<HashSet<TradeId>>,
    fail_all: std::sync::atomic::AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a permanent failure for the given trade id
    pub fn fail_trade(&self, trade_id: TradeId) {
        self.fail.lock().expect("lock poisoned").insert(trade_id);
    }

    /// Script a permanent failure for every dispatch
    pub fn fail_all(&self, fail: bool) {
        self.fail_all
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }

    /// Every dispatch call seen, duplicates included
    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().expect("lock poisoned").len()
    }

    /// Unique chain transfers performed (the idempotency contract)
    pub fn transfer_count(&self) -> usize {
        self.transferred.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl SettlementDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: SettlementRequest) -> SettlementOutcome {
        let trade_id = request.trade_id;
        self.dispatched
            .lock()
            .expect("lock poisoned")
            .push(request);

        let fail_all = self.fail_all.load(std::sync::atomic::Ordering::Relaxed);
        if fail_all || self.fail.lock().expect("lock poisoned").contains(&trade_id) {
            return SettlementOutcome::PermanentFailure {
                reason: "chain transfer rejected".into(),
            };
        }

        // Keyed by trade id: a retry never transfers twice
        self.transferred
            .lock()
            .expect("lock poisoned")
            .insert(trade_id);
        SettlementOutcome::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::Side;

    fn request() -> SettlementRequest {
        let trade = Trade::new(
            1,
            InstrumentId::new("PROP-0042"),
            types::ids::OrderId::new(),
            types::ids::OrderId::new(),
            TraderId::new(),
            TraderId::new(),
            Side::Buy,
            Price::from_u64(5),
            Quantity::from_u64(40),
            0,
        );
        SettlementRequest::from(&trade)
    }

    #[tokio::test]
    async fn test_auto_confirm() {
        let dispatcher = AutoConfirmDispatcher;
        assert_eq!(
            dispatcher.dispatch(request()).await,
            SettlementOutcome::Confirmed
        );
    }

    #[tokio::test]
    async fn test_recording_idempotency() {
        let dispatcher = RecordingDispatcher::new();
        let req = request();

        // Same trade dispatched twice: two calls, one transfer
        dispatcher.dispatch(req.clone()).await;
        dispatcher.dispatch(req).await;

        assert_eq!(dispatcher.dispatch_count(), 2);
        assert_eq!(dispatcher.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let dispatcher = RecordingDispatcher::new();
        let req = request();
        dispatcher.fail_trade(req.trade_id);

        let outcome = dispatcher.dispatch(req).await;
        assert!(matches!(
            outcome,
            SettlementOutcome::PermanentFailure { .. }
        ));
        assert_eq!(dispatcher.transfer_count(), 0);
    }
}
