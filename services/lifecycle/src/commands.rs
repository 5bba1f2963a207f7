//! Commands consumed by an instrument worker
//!
//! Submit and cancel carry `oneshot` reply channels; the caller awaits
//! the reply under a timeout. Settlement resolutions arrive through the
//! same queue so they are serialized with matching.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::oneshot;

use market_data::{Candle, Interval, PublicTrade, StatsSnapshot};
use matching_engine::book::DepthSnapshot;
use matching_engine::engine::SubmitRequest;
use types::errors::{CancelError, OrderError};
use types::ids::{InstrumentId, OrderId, TradeId, TraderId};
use types::numeric::Price;
use types::order::Order;
use types::trade::Trade;

/// Successful submission: the taker's final state plus its trades
#[derive(Debug, Clone)]
pub struct SubmitReply {
    pub order: Order,
    pub trades: Vec<Trade>,
}

/// Successful cancellation (status `Cancelled`, or `Expired` when the
/// cancel touched an order past its deadline)
#[derive(Debug, Clone)]
pub struct CancelReply {
    pub order: Order,
}

/// Statistics response: trailing-window figures plus live book reads
#[derive(Debug, Clone, Serialize)]
pub struct MarketStats {
    pub instrument_id: InstrumentId,
    #[serde(flatten)]
    pub window: StatsSnapshot,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Decimal>,
}

/// One unit of work on an instrument's queue
#[derive(Debug)]
pub enum Command {
    Submit {
        request: SubmitRequest,
        reply: oneshot::Sender<Result<SubmitReply, OrderError>>,
    },
    Cancel {
        order_id: OrderId,
        requester: TraderId,
        reply: oneshot::Sender<Result<CancelReply, CancelError>>,
    },
    /// Expire every resting order past its deadline (periodic)
    SweepExpired,
    /// Settlement collaborator confirmed the trade on-chain
    ConfirmTrade { trade_id: TradeId },
    /// Settlement collaborator reported permanent failure
    ReverseTrade { trade_id: TradeId, reason: String },
    GetDepth {
        levels: usize,
        reply: oneshot::Sender<DepthSnapshot>,
    },
    GetStats {
        reply: oneshot::Sender<MarketStats>,
    },
    GetCandles {
        interval: Interval,
        limit: usize,
        fill_gaps: bool,
        reply: oneshot::Sender<Vec<Candle>>,
    },
    GetTrades {
        limit: usize,
        reply: oneshot::Sender<Vec<PublicTrade>>,
    },
    GetOrder {
        order_id: OrderId,
        reply: oneshot::Sender<Option<Order>>,
    },
    GetTraderOrders {
        trader_id: TraderId,
        reply: oneshot::Sender<Vec<Order>>,
    },
    /// Snapshot this worker's recoverable state (quiescent checkpointing)
    GetCheckpointData {
        reply: oneshot::Sender<WorkerCheckpoint>,
    },
}

/// One worker's contribution to a checkpoint
#[derive(Debug, Clone)]
pub struct WorkerCheckpoint {
    pub instrument: types::instrument::Instrument,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub next_trade_sequence: u64,
}
