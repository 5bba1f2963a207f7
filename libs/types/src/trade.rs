//! Trade execution and settlement types
//!
//! A trade is ledger-confirmed the moment it is created inside the
//! matching path. It becomes chain-confirmed when the settlement
//! collaborator reports success, or reversed if the collaborator reports
//! a permanent failure — the only path by which a trade's balance
//! effects are undone.

use crate::ids::{InstrumentId, OrderId, TradeId, TraderId};
use crate::numeric::{notional, Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settlement state of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    /// Balances updated in the ledger; awaiting on-chain confirmation
    LedgerConfirmed,
    /// Settlement collaborator reported success (terminal)
    ChainConfirmed,
    /// Permanent settlement failure; balance effects compensated (terminal)
    Reversed,
}

/// An executed match between a maker and a taker order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Per-instrument monotonic sequence, assigned at execution
    pub sequence: u64,
    pub instrument_id: InstrumentId,

    // Order references
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,

    // The two counterparties by economic role
    pub buyer: TraderId,
    pub seller: TraderId,

    /// Side of the incoming (taker) order
    pub taker_side: Side,
    /// Execution price (always the maker's price)
    pub price: Price,
    pub quantity: Quantity,

    pub executed_at: i64, // Unix nanos
    /// When the trade reached a terminal settlement state
    pub resolved_at: Option<i64>,

    pub state: TradeState,
}

impl Trade {
    /// Create a new ledger-confirmed trade
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        instrument_id: InstrumentId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        buyer: TraderId,
        seller: TraderId,
        taker_side: Side,
        price: Price,
        quantity: Quantity,
        executed_at: i64,
    ) -> Self {
        Self {
            id: TradeId::new(),
            sequence,
            instrument_id,
            maker_order_id,
            taker_order_id,
            buyer,
            seller,
            taker_side,
            price,
            quantity,
            executed_at,
            resolved_at: None,
            state: TradeState::LedgerConfirmed,
        }
    }

    /// Cash value of the trade: price × quantity
    pub fn notional(&self) -> Decimal {
        notional(self.price, self.quantity)
    }

    /// Check if the trade has reached a terminal settlement state
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.state,
            TradeState::ChainConfirmed | TradeState::Reversed
        )
    }

    /// Mark the trade chain-confirmed
    ///
    /// # Panics
    /// Panics if the trade is already resolved.
    pub fn confirm(&mut self, timestamp: i64) {
        assert!(!self.is_resolved(), "Trade already resolved");
        self.state = TradeState::ChainConfirmed;
        self.resolved_at = Some(timestamp);
    }

    /// Mark the trade reversed after a permanent settlement failure
    ///
    /// # Panics
    /// Panics if the trade is already resolved.
    pub fn reverse(&mut self, timestamp: i64) {
        assert!(!self.is_resolved(), "Trade already resolved");
        self.state = TradeState::Reversed;
        self.resolved_at = Some(timestamp);
    }

    /// A trade never matches a trader against themselves
    pub fn validate_no_self_trade(&self) -> bool {
        self.buyer != self.seller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            1000,
            InstrumentId::new("PROP-0042"),
            OrderId::new(),
            OrderId::new(),
            TraderId::new(),
            TraderId::new(),
            Side::Buy,
            Price::from_u64(5),
            Quantity::from_u64(40),
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = sample_trade();
        assert_eq!(trade.state, TradeState::LedgerConfirmed);
        assert!(!trade.is_resolved());
        assert!(trade.validate_no_self_trade());
        assert_eq!(trade.notional(), Decimal::from(200));
    }

    #[test]
    fn test_trade_confirmation() {
        let mut trade = sample_trade();
        trade.confirm(1_708_123_456_790_000_000);
        assert_eq!(trade.state, TradeState::ChainConfirmed);
        assert!(trade.is_resolved());
        assert!(trade.resolved_at.is_some());
    }

    #[test]
    fn test_trade_reversal() {
        let mut trade = sample_trade();
        trade.reverse(1_708_123_456_790_000_000);
        assert_eq!(trade.state, TradeState::Reversed);
        assert!(trade.is_resolved());
    }

    #[test]
    #[should_panic(expected = "Trade already resolved")]
    fn test_double_resolution_panics() {
        let mut trade = sample_trade();
        trade.confirm(1);
        trade.reverse(2);
    }

    #[test]
    fn test_trade_serialization() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
    }
}
