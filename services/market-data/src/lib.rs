//! Market Data Service
//!
//! Derives market statistics from the trade stream: a rolling 24 h
//! window (volume, trade count, high/low, last price, percent change),
//! OHLC candle series at fixed intervals, and a bounded recent-trade
//! history. Everything here is a pure, recomputable projection over the
//! durable trade log — never a source of truth.
//!
//! Best bid/ask and spread are read directly from the order book by the
//! serving layer, not derived from trade history.

pub mod candles;
pub mod stats;
pub mod trades;

pub use candles::{Candle, CandleSeries, Interval};
pub use stats::{RollingStats, StatsSnapshot};
pub use trades::{PublicTrade, TradeHistory};
