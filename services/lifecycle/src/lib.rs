//! Order Lifecycle Manager
//!
//! Owns the per-instrument serialized command queues. Every submit,
//! cancel, sweep, and read for one instrument flows through that
//! instrument's single worker task, which makes the matching engine's
//! multi-step read-modify-write atomic without multi-object locks.
//!
//! Durable events are appended to the write-ahead log before the client
//! is acknowledged, then broadcast to subscribers. Settlement dispatch
//! is fire-and-forget: confirmations and permanent failures come back
//! through the same command queue, so trade resolution is serialized
//! with matching.

pub mod bootstrap;
pub mod commands;
pub mod exchange;
pub mod settlement;
pub mod worker;

pub use commands::{CancelReply, Command, MarketStats, SubmitReply};
pub use exchange::{Exchange, ExchangeConfig, ExchangeError};
pub use settlement::{
    AutoConfirmDispatcher, RecordingDispatcher, SettlementDispatcher, SettlementOutcome,
    SettlementRequest,
};
