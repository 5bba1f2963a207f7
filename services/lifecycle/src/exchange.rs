//! The exchange facade
//!
//! Owns the shared ledger, the write-ahead journal, the per-instrument
//! worker registry, and the event broadcast. Client-facing calls route
//! to the right worker queue and await the reply under a timeout; on
//! timeout the outcome is unknown and the caller must re-query.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{info, warn};

use ledger::{BalanceView, Ledger};
use market_data::{Candle, Interval, PublicTrade};
use matching_engine::book::DepthSnapshot;
use matching_engine::engine::SubmitRequest;
use persistence::checkpoint::{CheckpointError, CheckpointState, CheckpointStore};
use persistence::events::ExchangeEvent;
use persistence::recovery::{self, EventApplier, RecoveryError};
use persistence::wal::{WalConfig, WalError, WalReader, WalWriter};
use types::clock;
use types::errors::{CancelError, OrderError};
use types::ids::{InstrumentId, OrderId, TradeId, TraderId};
use types::instrument::Instrument;
use types::numeric::Quantity;
use types::order::Order;

use crate::bootstrap::BalanceSource;
use crate::commands::{CancelReply, Command, MarketStats, SubmitReply, WorkerCheckpoint};
use crate::settlement::SettlementDispatcher;
use crate::worker::InstrumentWorker;

/// Tunables for the exchange runtime
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Root for journal and checkpoint files
    pub data_dir: PathBuf,
    /// How long a submit/cancel waits for its worker reply
    pub command_timeout: Duration,
    /// Command queue depth per instrument
    pub queue_depth: usize,
    /// Period of the expiry sweep
    pub sweep_interval: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            command_timeout: Duration::from_secs(5),
            queue_depth: 1024,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Errors surfaced by the exchange API
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("Instrument {0} is already listed")]
    InstrumentExists(InstrumentId),

    #[error("Timed out awaiting the instrument worker; the command may still be processing — re-query order status")]
    Timeout,

    #[error("Instrument worker unavailable")]
    WorkerUnavailable,

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

/// Errors while opening the exchange (recovery path)
#[derive(Error, Debug)]
pub enum BootError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal error: {0}")]
    Wal(#[from] WalError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),
}

struct WorkerHandle {
    instrument: Instrument,
    tx: mpsc::Sender<Command>,
    halted: Arc<AtomicBool>,
}

/// The running exchange: workers, ledger, journal, broadcast
pub struct Exchange {
    config: ExchangeConfig,
    ledger: Arc<Ledger>,
    journal: Arc<Mutex<WalWriter>>,
    checkpoints: CheckpointStore,
    events_tx: broadcast::Sender<ExchangeEvent>,
    dispatcher: Arc<dyn SettlementDispatcher>,
    instruments: DashMap<InstrumentId, WorkerHandle>,
}

impl Exchange {
    /// Open the exchange: restore the latest checkpoint, replay the
    /// journal tail, and start a worker per recovered instrument
    pub async fn open(
        config: ExchangeConfig,
        dispatcher: Arc<dyn SettlementDispatcher>,
    ) -> Result<Arc<Self>, BootError> {
        let wal_dir = config.data_dir.join("wal");
        let checkpoint_dir = config.data_dir.join("checkpoints");

        let ledger = Arc::new(Ledger::new());
        let (events_tx, _) = broadcast::channel(4096);
        let checkpoints = CheckpointStore::new(&checkpoint_dir);

        // 1. Checkpoint restore
        let checkpoint = checkpoints.load_latest()?;
        let mut replay_after = 0u64;
        let journal = Arc::new(Mutex::new(WalWriter::open(WalConfig::new(&wal_dir))?));

        let mut workers: HashMap<InstrumentId, InstrumentWorker> = HashMap::new();
        if let Some(state) = checkpoint {
            replay_after = state.last_sequence;
            ledger.restore(state.balances.clone());

            let mut orders_by_instrument: HashMap<InstrumentId, Vec<Order>> = HashMap::new();
            for order in state.orders {
                orders_by_instrument
                    .entry(order.instrument_id.clone())
                    .or_default()
                    .push(order);
            }
            let mut trades_by_instrument: HashMap<InstrumentId, Vec<types::trade::Trade>> =
                HashMap::new();
            for trade in state.trades {
                trades_by_instrument
                    .entry(trade.instrument_id.clone())
                    .or_default()
                    .push(trade);
            }
            let sequences: HashMap<InstrumentId, u64> =
                state.trade_sequences.into_iter().collect();

            for instrument in state.instruments {
                let id = instrument.id.clone();
                let worker = InstrumentWorker::restore(
                    instrument,
                    orders_by_instrument.remove(&id).unwrap_or_default(),
                    trades_by_instrument.remove(&id).unwrap_or_default(),
                    sequences.get(&id).copied().unwrap_or(1),
                    ledger.clone(),
                    journal.clone(),
                    events_tx.clone(),
                    dispatcher.clone(),
                );
                workers.insert(id, worker);
            }
            info!(sequence = replay_after, "checkpoint restored");
        }

        // 2. Journal replay
        let reader = WalReader::open(&wal_dir);
        let mut applier = BootApplier {
            workers: &mut workers,
            ledger: &ledger,
            journal: &journal,
            events_tx: &events_tx,
            dispatcher: &dispatcher,
        };
        let report = recovery::replay(&reader, replay_after, &mut applier)?;
        journal
            .lock()
            .expect("journal lock poisoned")
            .set_next_sequence(report.last_sequence + 1);

        // 3. Start workers
        let exchange = Arc::new(Self {
            config,
            ledger,
            journal,
            checkpoints,
            events_tx,
            dispatcher,
            instruments: DashMap::new(),
        });
        for (_, worker) in workers {
            exchange.spawn_worker(worker);
        }
        Ok(exchange)
    }

    // ── Administration ──────────────────────────────────────────────

    /// List a new instrument and grant its full supply to the treasury
    /// holder (primary issuance is the out-of-scope collaborator; this
    /// is the hand-off point)
    pub fn list_instrument(
        &self,
        instrument: Instrument,
        treasury: TraderId,
    ) -> Result<(), ExchangeError> {
        if self.instruments.contains_key(&instrument.id) {
            return Err(ExchangeError::InstrumentExists(instrument.id.clone()));
        }

        let now = clock::now_nanos();
        self.append_events(&[
            ExchangeEvent::InstrumentListed {
                instrument: instrument.clone(),
            },
            ExchangeEvent::TokensGranted {
                trader_id: treasury,
                instrument_id: instrument.id.clone(),
                quantity: instrument.total_supply,
                timestamp: now,
            },
        ])?;
        self.ledger
            .credit_tokens(treasury, &instrument.id, instrument.total_supply);

        let worker = InstrumentWorker::new(
            instrument,
            self.ledger.clone(),
            self.journal.clone(),
            self.events_tx.clone(),
            self.dispatcher.clone(),
        );
        self.spawn_worker(worker);
        Ok(())
    }

    /// Credit cash reported by the external balance source
    pub fn deposit_cash(&self, trader: TraderId, amount: Decimal) -> Result<(), ExchangeError> {
        let now = clock::now_nanos();
        self.append_events(&[ExchangeEvent::CashDeposited {
            trader_id: trader,
            amount,
            timestamp: now,
        }])?;
        self.ledger.credit_cash(trader, amount);
        Ok(())
    }

    /// Credit tokens reported by the external balance source
    pub fn grant_tokens(
        &self,
        trader: TraderId,
        instrument_id: &InstrumentId,
        quantity: Quantity,
    ) -> Result<(), ExchangeError> {
        if !self.instruments.contains_key(instrument_id) {
            return Err(ExchangeError::UnknownInstrument(instrument_id.clone()));
        }
        let now = clock::now_nanos();
        self.append_events(&[ExchangeEvent::TokensGranted {
            trader_id: trader,
            instrument_id: instrument_id.clone(),
            quantity,
            timestamp: now,
        }])?;
        self.ledger.credit_tokens(trader, instrument_id, quantity);
        Ok(())
    }

    /// Seed balances from the external ledger of record
    pub fn seed_from(&self, source: &dyn BalanceSource) -> Result<(), ExchangeError> {
        for seed in source.load() {
            if seed.cash > Decimal::ZERO {
                self.deposit_cash(seed.trader_id, seed.cash)?;
            }
            for (instrument_id, quantity) in &seed.tokens {
                self.grant_tokens(seed.trader_id, instrument_id, *quantity)?;
            }
        }
        Ok(())
    }

    // ── Trading ─────────────────────────────────────────────────────

    pub async fn submit_order(
        &self,
        instrument_id: &InstrumentId,
        request: SubmitRequest,
    ) -> Result<SubmitReply, ExchangeError> {
        let reply = self
            .send_command(instrument_id, |reply| Command::Submit { request, reply })
            .await?;
        reply.map_err(ExchangeError::Order)
    }

    pub async fn cancel_order(
        &self,
        instrument_id: &InstrumentId,
        order_id: OrderId,
        requester: TraderId,
    ) -> Result<CancelReply, ExchangeError> {
        let reply = self
            .send_command(instrument_id, |reply| Command::Cancel {
                order_id,
                requester,
                reply,
            })
            .await?;
        reply.map_err(ExchangeError::Cancel)
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn depth(
        &self,
        instrument_id: &InstrumentId,
        levels: usize,
    ) -> Result<DepthSnapshot, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetDepth { levels, reply })
            .await
    }

    pub async fn stats(&self, instrument_id: &InstrumentId) -> Result<MarketStats, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetStats { reply })
            .await
    }

    pub async fn candles(
        &self,
        instrument_id: &InstrumentId,
        interval: Interval,
        limit: usize,
        fill_gaps: bool,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetCandles {
            interval,
            limit,
            fill_gaps,
            reply,
        })
        .await
    }

    pub async fn recent_trades(
        &self,
        instrument_id: &InstrumentId,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetTrades { limit, reply })
            .await
    }

    pub async fn order(
        &self,
        instrument_id: &InstrumentId,
        order_id: OrderId,
    ) -> Result<Option<Order>, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetOrder { order_id, reply })
            .await
    }

    pub async fn trader_orders(
        &self,
        instrument_id: &InstrumentId,
        trader_id: TraderId,
    ) -> Result<Vec<Order>, ExchangeError> {
        self.send_command(instrument_id, |reply| Command::GetTraderOrders {
            trader_id,
            reply,
        })
        .await
    }

    /// Direct ledger read; no worker round-trip
    pub fn balances(&self, trader: TraderId) -> Option<BalanceView> {
        self.ledger.view(trader)
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        let mut instruments: Vec<Instrument> = self
            .instruments
            .iter()
            .map(|entry| entry.value().instrument.clone())
            .collect();
        instruments.sort_by(|a, b| a.id.cmp(&b.id));
        instruments
    }

    pub fn is_halted(&self, instrument_id: &InstrumentId) -> Option<bool> {
        self.instruments
            .get(instrument_id)
            .map(|h| h.halted.load(Ordering::Relaxed))
    }

    /// Subscribe to the durable event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events_tx.subscribe()
    }

    // ── Checkpointing ───────────────────────────────────────────────

    /// Write a checkpoint of the current state
    ///
    /// Intended for the quiescent shutdown path: worker states are
    /// gathered sequentially, so in-flight client traffic on other
    /// instruments would land astride the cut.
    pub async fn checkpoint(&self) -> Result<PathBuf, ExchangeError> {
        let ids: Vec<InstrumentId> = self
            .instruments
            .iter()
            .map(|e| e.key().clone())
            .collect();

        let mut instruments = Vec::new();
        let mut orders = Vec::new();
        let mut trades = Vec::new();
        let mut trade_sequences = Vec::new();
        for id in ids {
            let data: WorkerCheckpoint = self
                .send_command(&id, |reply| Command::GetCheckpointData { reply })
                .await?;
            instruments.push(data.instrument);
            orders.extend(data.orders);
            trades.extend(data.trades);
            trade_sequences.push((id, data.next_trade_sequence));
        }

        let last_sequence = {
            let mut journal = self.journal.lock().expect("journal lock poisoned");
            journal
                .sync()
                .map_err(|e| ExchangeError::Persistence(e.to_string()))?;
            journal.next_sequence() - 1
        };

        let state = CheckpointState {
            last_sequence,
            taken_at: clock::now_nanos(),
            instruments,
            balances: self.ledger.all_views(),
            orders,
            trades,
            trade_sequences,
        };
        self.checkpoints
            .write(&state)
            .map_err(|e| ExchangeError::Persistence(e.to_string()))
    }

    // ── Internals ───────────────────────────────────────────────────

    fn spawn_worker(&self, worker: InstrumentWorker) {
        let instrument = worker.instrument().clone();
        let halted = worker.halted_flag();
        let (tx, rx) = mpsc::channel(self.config.queue_depth);

        // Worker and sweep ticker hold weak senders only; the queue
        // closes once the exchange drops its handle.
        tokio::spawn(worker.run(rx, tx.downgrade()));

        let sweep_tx = tx.downgrade();
        let sweep_interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let Some(tx) = sweep_tx.upgrade() else { break };
                if tx.send(Command::SweepExpired).await.is_err() {
                    break;
                }
            }
        });

        self.instruments.insert(
            instrument.id.clone(),
            WorkerHandle {
                instrument,
                tx,
                halted,
            },
        );
    }

    async fn send_command<T>(
        &self,
        instrument_id: &InstrumentId,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ExchangeError> {
        let tx = self
            .instruments
            .get(instrument_id)
            .map(|h| h.tx.clone())
            .ok_or_else(|| ExchangeError::UnknownInstrument(instrument_id.clone()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(build(reply_tx))
            .await
            .map_err(|_| ExchangeError::WorkerUnavailable)?;

        match timeout(self.config.command_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ExchangeError::WorkerUnavailable),
            Err(_) => Err(ExchangeError::Timeout),
        }
    }

    fn append_events(&self, events: &[ExchangeEvent]) -> Result<(), ExchangeError> {
        let now = clock::now_nanos();
        let mut journal = self.journal.lock().expect("journal lock poisoned");
        for event in events {
            journal
                .append_event(now, event)
                .map_err(|e| ExchangeError::Persistence(e.to_string()))?;
        }
        drop(journal);
        for event in events {
            let _ = self.events_tx.send(event.clone());
        }
        Ok(())
    }
}

/// Routes replayed events into ledger and worker state during boot
struct BootApplier<'a> {
    workers: &'a mut HashMap<InstrumentId, InstrumentWorker>,
    ledger: &'a Arc<Ledger>,
    journal: &'a Arc<Mutex<WalWriter>>,
    events_tx: &'a broadcast::Sender<ExchangeEvent>,
    dispatcher: &'a Arc<dyn SettlementDispatcher>,
}

impl EventApplier for BootApplier<'_> {
    fn apply(&mut self, event: &ExchangeEvent, sequence: u64) -> Result<(), String> {
        match event {
            ExchangeEvent::InstrumentListed { instrument } => {
                let worker = InstrumentWorker::new(
                    instrument.clone(),
                    self.ledger.clone(),
                    self.journal.clone(),
                    self.events_tx.clone(),
                    self.dispatcher.clone(),
                );
                self.workers.insert(instrument.id.clone(), worker);
                Ok(())
            }
            ExchangeEvent::CashDeposited {
                trader_id, amount, ..
            } => {
                self.ledger.credit_cash(*trader_id, *amount);
                Ok(())
            }
            ExchangeEvent::TokensGranted {
                trader_id,
                instrument_id,
                quantity,
                ..
            } => {
                self.ledger
                    .credit_tokens(*trader_id, instrument_id, *quantity);
                Ok(())
            }
            other => {
                let instrument_id = other
                    .instrument_id()
                    .ok_or_else(|| format!("event at sequence {} lacks an instrument", sequence))?;
                let worker = self.workers.get_mut(instrument_id).ok_or_else(|| {
                    format!(
                        "event at sequence {} references unknown instrument {}",
                        sequence, instrument_id
                    )
                })?;
                worker.apply_event(other)
            }
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if let Ok(mut journal) = self.journal.lock() {
            if let Err(err) = journal.sync() {
                warn!(%err, "journal sync on shutdown failed");
            }
        }
    }
}
