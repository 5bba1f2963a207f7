//! Public trade feed
//!
//! Bounded history of executed trades stripped to public fields (no
//! counterparty identities), newest-first retrieval for the trades
//! endpoint.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::TradeId;
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// A trade as broadcast to the public feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub trade_id: TradeId,
    pub sequence: u64,
    pub price: Price,
    pub quantity: Quantity,
    /// price × quantity
    pub value: Decimal,
    /// BUY = buyer was the taker, SELL = seller was the taker
    pub taker_side: Side,
    pub executed_at: i64,
}

impl From<&Trade> for PublicTrade {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            sequence: trade.sequence,
            price: trade.price,
            quantity: trade.quantity,
            value: trade.notional(),
            taker_side: trade.taker_side,
            executed_at: trade.executed_at,
        }
    }
}

/// Bounded ring of recent public trades
#[derive(Debug, Clone)]
pub struct TradeHistory {
    history: VecDeque<PublicTrade>,
    max_history: usize,
}

impl TradeHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    /// Record an executed trade, evicting the oldest at capacity
    pub fn record(&mut self, trade: &Trade) -> PublicTrade {
        let public = PublicTrade::from(trade);
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(public.clone());
        public
    }

    /// Recent trades, newest first
    pub fn recent(&self, limit: usize) -> Vec<PublicTrade> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
