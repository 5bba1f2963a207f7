//! The per-instrument worker
//!
//! One task per instrument consumes its command queue in FIFO order.
//! Only this task touches the instrument's engine, book, statistics,
//! and trade store, so every multi-step mutation is atomic with respect
//! to other commands. The only state shared with other workers is the
//! ledger, which guards itself with per-trader locks.
//!
//! A fatal ledger fault halts the instrument: submits and cancels are
//! rejected until an operator confirms ledger integrity, while reads
//! keep serving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use ledger::{Ledger, Reservation};
use market_data::{Candle, CandleSeries, Interval, PublicTrade, RollingStats, TradeHistory};
use matching_engine::engine::{
    CancelFailure, InstrumentEngine, SubmitError, SubmitOutcome, SubmitRequest,
};
use persistence::events::{ExchangeEvent, ReservedFunds};
use persistence::wal::WalWriter;
use types::clock;
use types::errors::{CancelError, LedgerError, OrderError};
use types::ids::{OrderId, TradeId, TraderId};
use types::instrument::Instrument;
use types::order::{Order, OrderStatus};
use types::trade::Trade;

use crate::commands::{CancelReply, Command, MarketStats, SubmitReply, WorkerCheckpoint};
use crate::settlement::{SettlementDispatcher, SettlementOutcome, SettlementRequest};

const CANDLE_HISTORY: usize = 1_000;
const TRADE_HISTORY: usize = 1_000;

/// State and behavior of one instrument's worker task
pub struct InstrumentWorker {
    engine: InstrumentEngine,
    ledger: Arc<Ledger>,
    stats: RollingStats,
    candles: HashMap<Interval, CandleSeries>,
    history: TradeHistory,
    trades: HashMap<TradeId, Trade>,
    halted: Arc<AtomicBool>,
    journal: Arc<Mutex<WalWriter>>,
    events_tx: broadcast::Sender<ExchangeEvent>,
    dispatcher: Arc<dyn SettlementDispatcher>,
    /// Queue handle for settlement resolutions; set when the task
    /// starts. Weak so the worker does not keep its own queue alive
    /// after the exchange drops.
    self_tx: Option<mpsc::WeakSender<Command>>,
}

impl InstrumentWorker {
    pub fn new(
        instrument: Instrument,
        ledger: Arc<Ledger>,
        journal: Arc<Mutex<WalWriter>>,
        events_tx: broadcast::Sender<ExchangeEvent>,
        dispatcher: Arc<dyn SettlementDispatcher>,
    ) -> Self {
        let engine = InstrumentEngine::new(instrument, ledger.clone());
        Self::from_engine(engine, ledger, journal, events_tx, dispatcher)
    }

    /// Rebuild a worker from checkpointed state
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        instrument: Instrument,
        orders: Vec<Order>,
        trades: Vec<Trade>,
        next_trade_sequence: u64,
        ledger: Arc<Ledger>,
        journal: Arc<Mutex<WalWriter>>,
        events_tx: broadcast::Sender<ExchangeEvent>,
        dispatcher: Arc<dyn SettlementDispatcher>,
    ) -> Self {
        let engine =
            InstrumentEngine::restore(instrument, orders, next_trade_sequence, ledger.clone());
        let mut worker = Self::from_engine(engine, ledger, journal, events_tx, dispatcher);
        for trade in trades {
            worker.record_market_data(&trade);
            worker.trades.insert(trade.id, trade);
        }
        worker
    }

    fn from_engine(
        engine: InstrumentEngine,
        ledger: Arc<Ledger>,
        journal: Arc<Mutex<WalWriter>>,
        events_tx: broadcast::Sender<ExchangeEvent>,
        dispatcher: Arc<dyn SettlementDispatcher>,
    ) -> Self {
        let candles = Interval::all()
            .iter()
            .map(|&interval| (interval, CandleSeries::new(interval, CANDLE_HISTORY)))
            .collect();
        Self {
            engine,
            ledger,
            stats: RollingStats::default(),
            candles,
            history: TradeHistory::new(TRADE_HISTORY),
            trades: HashMap::new(),
            halted: Arc::new(AtomicBool::new(false)),
            journal,
            events_tx,
            dispatcher,
            self_tx: None,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        self.engine.instrument()
    }

    /// Shared flag the exchange reads to report halted instruments
    pub fn halted_flag(&self) -> Arc<AtomicBool> {
        self.halted.clone()
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Consume the command queue until every external sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<Command>, self_tx: mpsc::WeakSender<Command>) {
        self.self_tx = Some(self_tx);
        info!(instrument = %self.instrument().id, "instrument worker started");

        // Trades recovered in ledger-confirmed state still await a
        // settlement outcome; dispatch is idempotent by trade id, so
        // re-dispatching after a crash is safe.
        let unresolved: Vec<Trade> = self
            .trades
            .values()
            .filter(|t| !t.is_resolved())
            .cloned()
            .collect();
        for trade in unresolved {
            self.dispatch_settlement(&trade);
        }

        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        info!(instrument = %self.instrument().id, "instrument worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { request, reply } => {
                let _ = reply.send(self.handle_submit(request));
            }
            Command::Cancel {
                order_id,
                requester,
                reply,
            } => {
                let _ = reply.send(self.handle_cancel(order_id, requester));
            }
            Command::SweepExpired => self.handle_sweep(),
            Command::ConfirmTrade { trade_id } => self.handle_confirm(trade_id),
            Command::ReverseTrade { trade_id, reason } => self.handle_reverse(trade_id, reason),
            Command::GetDepth { levels, reply } => {
                let _ = reply.send(self.engine.depth(levels));
            }
            Command::GetStats { reply } => {
                let _ = reply.send(self.market_stats());
            }
            Command::GetCandles {
                interval,
                limit,
                fill_gaps,
                reply,
            } => {
                let _ = reply.send(self.candles_view(interval, limit, fill_gaps));
            }
            Command::GetTrades { limit, reply } => {
                let _ = reply.send(self.recent_trades(limit));
            }
            Command::GetOrder { order_id, reply } => {
                let _ = reply.send(self.engine.order(&order_id).cloned());
            }
            Command::GetTraderOrders { trader_id, reply } => {
                let _ = reply.send(self.engine.orders_for_trader(trader_id));
            }
            Command::GetCheckpointData { reply } => {
                let _ = reply.send(self.checkpoint_data());
            }
        }
    }

    // ── Submission ──────────────────────────────────────────────────

    fn handle_submit(&mut self, request: SubmitRequest) -> Result<SubmitReply, OrderError> {
        if self.is_halted() {
            return Err(OrderError::InstrumentHalted {
                instrument_id: self.instrument().id.clone(),
            });
        }

        let now = clock::now_nanos();
        match self.engine.submit(request, now) {
            Ok(outcome) => {
                let events = self.events_for_submit(&outcome);
                if self.journal_events(&events, now).is_err() {
                    // Durability lost: state is applied but unacknowledged.
                    // The client must re-query after the halt clears.
                    return Err(OrderError::InstrumentHalted {
                        instrument_id: self.instrument().id.clone(),
                    });
                }
                self.broadcast(events);
                for trade in &outcome.trades {
                    self.record_trade(trade);
                }
                Ok(SubmitReply {
                    order: outcome.order,
                    trades: outcome.trades,
                })
            }
            Err(SubmitError::Rejected(err)) => Err(err),
            Err(SubmitError::Fatal(err)) => {
                self.halt("order submission", &err);
                Err(OrderError::InstrumentHalted {
                    instrument_id: self.instrument().id.clone(),
                })
            }
        }
    }

    /// The durable event sequence for one submit outcome
    fn events_for_submit(&self, outcome: &SubmitOutcome) -> Vec<ExchangeEvent> {
        let instrument_id = self.instrument().id.clone();
        let mut events = Vec::with_capacity(2 + outcome.trades.len());

        events.push(ExchangeEvent::OrderAccepted {
            order: outcome.accepted.clone(),
            reserved: reserved_funds(&outcome.reserved),
        });
        for maker in &outcome.expired_makers {
            events.push(ExchangeEvent::OrderExpired {
                instrument_id: instrument_id.clone(),
                order_id: maker.id,
                timestamp: maker.updated_at,
            });
        }
        for trade in &outcome.trades {
            events.push(ExchangeEvent::TradeExecuted {
                trade: trade.clone(),
            });
        }
        match outcome.order.status {
            // Market remainder was cancelled in the same turn
            OrderStatus::Cancelled => events.push(ExchangeEvent::OrderCancelled {
                instrument_id,
                order_id: outcome.order.id,
                timestamp: outcome.order.updated_at,
            }),
            // Limit remainder went to the book
            OrderStatus::Open | OrderStatus::PartiallyFilled => {
                events.push(ExchangeEvent::OrderRested {
                    instrument_id,
                    order_id: outcome.order.id,
                })
            }
            OrderStatus::Filled | OrderStatus::Expired => {}
        }
        events
    }

    // ── Cancellation & expiry ───────────────────────────────────────

    fn handle_cancel(
        &mut self,
        order_id: OrderId,
        requester: TraderId,
    ) -> Result<CancelReply, CancelError> {
        if self.is_halted() {
            return Err(CancelError::InstrumentHalted {
                instrument_id: self.instrument().id.clone(),
            });
        }

        let now = clock::now_nanos();
        match self.engine.cancel(order_id, requester, now) {
            Ok(outcome) => {
                let event = if outcome.order.status == OrderStatus::Expired {
                    ExchangeEvent::OrderExpired {
                        instrument_id: self.instrument().id.clone(),
                        order_id: outcome.order.id,
                        timestamp: outcome.order.updated_at,
                    }
                } else {
                    ExchangeEvent::OrderCancelled {
                        instrument_id: self.instrument().id.clone(),
                        order_id: outcome.order.id,
                        timestamp: outcome.order.updated_at,
                    }
                };
                if self.journal_events(std::slice::from_ref(&event), now).is_err() {
                    return Err(CancelError::InstrumentHalted {
                        instrument_id: self.instrument().id.clone(),
                    });
                }
                self.broadcast(vec![event]);
                Ok(CancelReply {
                    order: outcome.order,
                })
            }
            Err(CancelFailure::Rejected(err)) => Err(err),
            Err(CancelFailure::Fatal(err)) => {
                self.halt("cancellation", &err);
                Err(CancelError::InstrumentHalted {
                    instrument_id: self.instrument().id.clone(),
                })
            }
        }
    }

    fn handle_sweep(&mut self) {
        if self.is_halted() {
            return;
        }
        let now = clock::now_nanos();
        match self.engine.sweep_expired(now) {
            Ok(expired) if expired.is_empty() => {}
            Ok(expired) => {
                debug!(
                    instrument = %self.instrument().id,
                    count = expired.len(),
                    "expired orders swept"
                );
                let events: Vec<ExchangeEvent> = expired
                    .iter()
                    .map(|order| ExchangeEvent::OrderExpired {
                        instrument_id: self.instrument().id.clone(),
                        order_id: order.id,
                        timestamp: order.updated_at,
                    })
                    .collect();
                if self.journal_events(&events, now).is_ok() {
                    self.broadcast(events);
                }
            }
            Err(err) => self.halt("expiry sweep", &err),
        }
    }

    // ── Settlement resolution ───────────────────────────────────────

    fn handle_confirm(&mut self, trade_id: TradeId) {
        let now = clock::now_nanos();
        let Some(trade) = self.trades.get_mut(&trade_id) else {
            warn!(%trade_id, "confirmation for unknown trade");
            return;
        };
        if trade.is_resolved() {
            debug!(%trade_id, "confirmation for already-resolved trade ignored");
            return;
        }
        trade.confirm(now);

        let event = ExchangeEvent::TradeChainConfirmed {
            instrument_id: self.instrument().id.clone(),
            trade_id,
            timestamp: now,
        };
        if self.journal_events(std::slice::from_ref(&event), now).is_ok() {
            self.broadcast(vec![event]);
        }
    }

    fn handle_reverse(&mut self, trade_id: TradeId, reason: String) {
        if self.is_halted() {
            warn!(%trade_id, "reversal deferred: instrument is halted");
            return;
        }
        let now = clock::now_nanos();
        let Some(trade) = self.trades.get(&trade_id) else {
            warn!(%trade_id, "reversal for unknown trade");
            return;
        };
        if trade.is_resolved() {
            debug!(%trade_id, "reversal for already-resolved trade ignored");
            return;
        }

        let (buyer, seller, price, quantity) =
            (trade.buyer, trade.seller, trade.price, trade.quantity);
        let instrument_id = self.instrument().id.clone();
        if let Err(err) = self
            .ledger
            .reverse_trade(buyer, seller, &instrument_id, price, quantity)
        {
            error!(
                %trade_id, %buyer, %seller, %price, %quantity, %err,
                "compensating reversal failed"
            );
            self.halt("trade reversal", &err);
            return;
        }

        let trade = self.trades.get_mut(&trade_id).expect("checked above");
        trade.reverse(now);
        warn!(%trade_id, reason, "trade reversed after permanent settlement failure");

        let event = ExchangeEvent::TradeReversed {
            instrument_id: self.instrument().id.clone(),
            trade_id,
            timestamp: now,
        };
        if self.journal_events(std::slice::from_ref(&event), now).is_ok() {
            self.broadcast(vec![event]);
        }
    }

    // ── Market data & reads ─────────────────────────────────────────

    fn record_trade(&mut self, trade: &Trade) {
        self.record_market_data(trade);
        self.trades.insert(trade.id, trade.clone());
        self.dispatch_settlement(trade);
    }

    fn record_market_data(&mut self, trade: &Trade) {
        self.stats
            .record(trade.price, trade.quantity, trade.executed_at);
        for series in self.candles.values_mut() {
            series.record(trade.price, trade.quantity, trade.executed_at);
        }
        self.history.record(trade);
    }

    fn dispatch_settlement(&self, trade: &Trade) {
        let Some(self_tx) = self.self_tx.clone() else {
            // Replay path: unresolved trades are re-dispatched once the
            // worker task is live.
            return;
        };
        let dispatcher = self.dispatcher.clone();
        let request = SettlementRequest::from(trade);
        let trade_id = trade.id;

        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(request).await;
            // The queue may be gone if the exchange shut down meanwhile;
            // dispatch is idempotent and will be retried on next boot.
            let Some(tx) = self_tx.upgrade() else { return };
            match outcome {
                SettlementOutcome::Confirmed => {
                    let _ = tx.send(Command::ConfirmTrade { trade_id }).await;
                }
                SettlementOutcome::PermanentFailure { reason } => {
                    let _ = tx.send(Command::ReverseTrade { trade_id, reason }).await;
                }
            }
        });
    }

    fn market_stats(&mut self) -> MarketStats {
        let now = clock::now_nanos();
        let book = self.engine.book();
        let (best_bid, best_ask, spread) = (book.best_bid(), book.best_ask(), book.spread());
        MarketStats {
            instrument_id: self.instrument().id.clone(),
            window: self.stats.snapshot(now),
            best_bid,
            best_ask,
            spread,
        }
    }

    fn candles_view(&self, interval: Interval, limit: usize, fill_gaps: bool) -> Vec<Candle> {
        match self.candles.get(&interval) {
            Some(series) if fill_gaps => series.candles_gap_filled(limit),
            Some(series) => series.candles(limit),
            None => Vec::new(),
        }
    }

    fn recent_trades(&self, limit: usize) -> Vec<PublicTrade> {
        self.history.recent(limit)
    }

    fn checkpoint_data(&self) -> WorkerCheckpoint {
        WorkerCheckpoint {
            instrument: self.instrument().clone(),
            orders: self.engine.all_orders(),
            trades: self.trades.values().cloned().collect(),
            next_trade_sequence: self.engine.next_sequence(),
        }
    }

    // ── Replay ──────────────────────────────────────────────────────

    /// Apply one journaled event during recovery
    pub fn apply_event(&mut self, event: &ExchangeEvent) -> Result<(), String> {
        match event {
            ExchangeEvent::OrderAccepted { order, reserved } => {
                let reservation = to_reservation(self.instrument(), reserved);
                self.engine
                    .apply_accepted(order.clone(), &reservation)
                    .map_err(|e| e.to_string())
            }
            ExchangeEvent::OrderRested { order_id, .. } => self
                .engine
                .apply_rested(order_id)
                .map_err(|e| e.to_string()),
            ExchangeEvent::TradeExecuted { trade } => {
                self.engine.apply_trade(trade).map_err(|e| e.to_string())?;
                self.record_market_data(trade);
                self.trades.insert(trade.id, trade.clone());
                Ok(())
            }
            ExchangeEvent::OrderCancelled {
                order_id,
                timestamp,
                ..
            } => self
                .engine
                .apply_cancelled(order_id, *timestamp)
                .map_err(|e| e.to_string()),
            ExchangeEvent::OrderExpired {
                order_id,
                timestamp,
                ..
            } => self
                .engine
                .apply_expired(order_id, *timestamp)
                .map_err(|e| e.to_string()),
            ExchangeEvent::TradeChainConfirmed {
                trade_id,
                timestamp,
                ..
            } => {
                if let Some(trade) = self.trades.get_mut(trade_id) {
                    if !trade.is_resolved() {
                        trade.confirm(*timestamp);
                    }
                }
                Ok(())
            }
            ExchangeEvent::TradeReversed {
                trade_id,
                timestamp,
                ..
            } => {
                let Some(trade) = self.trades.get_mut(trade_id) else {
                    return Err(format!("reversal for unknown trade {}", trade_id));
                };
                if trade.is_resolved() {
                    return Ok(());
                }
                let (buyer, seller, price, quantity) =
                    (trade.buyer, trade.seller, trade.price, trade.quantity);
                trade.reverse(*timestamp);
                let instrument_id = self.instrument().id.clone();
                self.ledger
                    .reverse_trade(buyer, seller, &instrument_id, price, quantity)
                    .map_err(|e| e.to_string())
            }
            other => Err(format!(
                "event {} is not instrument-scoped",
                other.kind()
            )),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn journal_events(&mut self, events: &[ExchangeEvent], now: i64) -> Result<(), ()> {
        let mut journal = self.journal.lock().expect("journal lock poisoned");
        for event in events {
            if let Err(err) = journal.append_event(now, event) {
                drop(journal);
                error!(
                    instrument = %self.instrument().id, %err,
                    "write-ahead append failed"
                );
                self.halt_flag_only();
                return Err(());
            }
        }
        Ok(())
    }

    fn broadcast(&self, events: Vec<ExchangeEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.events_tx.send(event);
        }
    }

    fn halt(&self, context: &str, err: &LedgerError) {
        error!(
            instrument = %self.instrument().id,
            context,
            %err,
            "invariant violation: instrument halted for operator review"
        );
        self.halt_flag_only();
    }

    fn halt_flag_only(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }
}

/// Serializable form of a reservation for the journal
pub(crate) fn reserved_funds(reservation: &Reservation) -> ReservedFunds {
    match reservation {
        Reservation::Tokens { quantity, .. } => ReservedFunds::Tokens {
            quantity: *quantity,
        },
        Reservation::Cash { notional } => ReservedFunds::Cash {
            notional: *notional,
        },
    }
}

/// Rehydrate a journaled reservation against this worker's instrument
pub(crate) fn to_reservation(instrument: &Instrument, funds: &ReservedFunds) -> Reservation {
    match funds {
        ReservedFunds::Tokens { quantity } => {
            Reservation::tokens(instrument.id.clone(), *quantity)
        }
        ReservedFunds::Cash { notional } => Reservation::cash(*notional),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::wal::WalConfig;
    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use types::ids::InstrumentId;
    use types::numeric::{Price, Quantity};
    use types::order::{OrderKind, Side};

    fn instrument() -> Instrument {
        Instrument::new(
            InstrumentId::new("PROP-0042"),
            Quantity::from_u64(10_000),
            Price::from_str("0.01").unwrap(),
            Quantity::from_u64(1),
            0,
        )
    }

    fn worker(tmp: &TempDir) -> (InstrumentWorker, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::new());
        let journal = Arc::new(Mutex::new(
            WalWriter::open(WalConfig::new(tmp.path())).unwrap(),
        ));
        let (events_tx, _) = broadcast::channel(256);
        let worker = InstrumentWorker::new(
            instrument(),
            ledger.clone(),
            journal,
            events_tx,
            Arc::new(crate::settlement::AutoConfirmDispatcher),
        );
        (worker, ledger)
    }

    fn sell(trader: TraderId, price: u64, qty: u64) -> SubmitRequest {
        SubmitRequest {
            trader_id: trader,
            side: Side::Sell,
            kind: OrderKind::Limit(Price::from_u64(price)),
            quantity: Quantity::from_u64(qty),
            expires_at: None,
        }
    }

    fn market_buy(trader: TraderId, qty: u64) -> SubmitRequest {
        SubmitRequest {
            trader_id: trader,
            side: Side::Buy,
            kind: OrderKind::Market,
            quantity: Quantity::from_u64(qty),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_submit_journals_before_reply() {
        let tmp = TempDir::new().unwrap();
        let (mut worker, ledger) = worker(&tmp);

        let seller = TraderId::new();
        ledger.credit_tokens(seller, &instrument().id, Quantity::from_u64(100));

        let reply = worker.handle_submit(sell(seller, 5, 100)).unwrap();
        assert_eq!(reply.order.status, OrderStatus::Open);

        // Acceptance + resting are on disk before the reply exists
        let entries = persistence::wal::WalReader::open(tmp.path())
            .read_all()
            .unwrap();
        let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["OrderAccepted", "OrderRested"]);
    }

    #[tokio::test]
    async fn test_trade_event_sequence() {
        let tmp = TempDir::new().unwrap();
        let (mut worker, ledger) = worker(&tmp);

        let seller = TraderId::new();
        let buyer = TraderId::new();
        ledger.credit_tokens(seller, &instrument().id, Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));

        worker.handle_submit(sell(seller, 5, 100)).unwrap();
        let reply = worker.handle_submit(market_buy(buyer, 40)).unwrap();
        assert_eq!(reply.trades.len(), 1);

        let entries = persistence::wal::WalReader::open(tmp.path())
            .read_all()
            .unwrap();
        let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "OrderAccepted",
                "OrderRested",
                "OrderAccepted",
                "TradeExecuted"
            ]
        );
    }

    #[tokio::test]
    async fn test_halted_rejects_submit_and_cancel() {
        let tmp = TempDir::new().unwrap();
        let (mut worker, ledger) = worker(&tmp);
        let seller = TraderId::new();
        ledger.credit_tokens(seller, &instrument().id, Quantity::from_u64(100));

        worker.halt_flag_only();

        let err = worker.handle_submit(sell(seller, 5, 10)).unwrap_err();
        assert!(matches!(err, OrderError::InstrumentHalted { .. }));

        let err = worker
            .handle_cancel(OrderId::new(), seller)
            .unwrap_err();
        assert!(matches!(err, CancelError::InstrumentHalted { .. }));
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mut worker, ledger) = worker(&tmp);

        let seller = TraderId::new();
        let buyer = TraderId::new();
        ledger.credit_tokens(seller, &instrument().id, Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));

        worker.handle_submit(sell(seller, 5, 100)).unwrap();
        let reply = worker.handle_submit(market_buy(buyer, 40)).unwrap();
        let trade_id = reply.trades[0].id;

        worker.handle_confirm(trade_id);
        worker.handle_confirm(trade_id); // duplicate resolution is ignored

        let trade = worker.trades.get(&trade_id).unwrap();
        assert_eq!(trade.state, types::trade::TradeState::ChainConfirmed);
    }

    #[tokio::test]
    async fn test_reverse_compensates_ledger() {
        let tmp = TempDir::new().unwrap();
        let (mut worker, ledger) = worker(&tmp);

        let seller = TraderId::new();
        let buyer = TraderId::new();
        ledger.credit_tokens(seller, &instrument().id, Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));

        worker.handle_submit(sell(seller, 5, 100)).unwrap();
        let reply = worker.handle_submit(market_buy(buyer, 40)).unwrap();
        let trade_id = reply.trades[0].id;

        worker.handle_reverse(trade_id, "chain rejected".into());

        let buyer_view = ledger.view(buyer).unwrap();
        assert_eq!(buyer_view.cash_balance, Decimal::from(1000));
        assert!(buyer_view.positions.is_empty());
        assert_eq!(
            worker.trades.get(&trade_id).unwrap().state,
            types::trade::TradeState::Reversed
        );
    }
}
