//! Order lifecycle types
//!
//! An order moves `Open → PartiallyFilled → Filled | Cancelled | Expired`;
//! the last three states are terminal. Only the matching engine mutates
//! fill progress and status, and it does so through the methods here.

use crate::ids::{InstrumentId, OrderId, TraderId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order pricing kind
///
/// A limit order carries its price by construction; market orders have
/// none and never rest on the book. Externally tagged so the journal's
/// bincode framing round-trips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Execute at the given price or better; remainder rests
    #[serde(rename = "LIMIT")]
    Limit(Price),
    /// Execute immediately against the book; remainder is cancelled
    #[serde(rename = "MARKET")]
    Market,
}

impl OrderKind {
    /// The limit price, if any
    pub fn limit_price(&self) -> Option<Price> {
        match self {
            OrderKind::Limit(price) => Some(*price),
            OrderKind::Market => None,
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, no fills yet
    Open,
    /// Some quantity filled, remainder still working
    PartiallyFilled,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled by the trader (terminal)
    Cancelled,
    /// Expiry deadline passed (terminal)
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

/// A buy or sell order for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
    pub side: Side,
    pub kind: OrderKind,
    pub original_quantity: Quantity,
    pub filled_quantity: Quantity,
    pub status: OrderStatus,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
    /// Optional expiry deadline (Unix nanos)
    pub expires_at: Option<i64>,
}

impl Order {
    /// Create a new open order
    pub fn new(
        instrument_id: InstrumentId,
        trader_id: TraderId,
        side: Side,
        kind: OrderKind,
        quantity: Quantity,
        timestamp: i64,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            instrument_id,
            trader_id,
            side,
            kind,
            original_quantity: quantity,
            filled_quantity: Quantity::zero(),
            status: OrderStatus::Open,
            created_at: timestamp,
            updated_at: timestamp,
            expires_at,
        }
    }

    /// Quantity still working: original − filled
    pub fn remaining_quantity(&self) -> Quantity {
        self.original_quantity
            .checked_sub(self.filled_quantity)
            .unwrap_or(Quantity::zero())
    }

    /// The limit price, if this is a limit order
    pub fn limit_price(&self) -> Option<Price> {
        self.kind.limit_price()
    }

    /// Check quantity invariant: 0 ≤ filled ≤ original
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity <= self.original_quantity
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.original_quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Check whether the expiry deadline has passed at the given time
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    /// Record a fill and adjust status
    ///
    /// # Panics
    /// Panics if the fill would exceed the original quantity; overfilling
    /// an order is a programming error, not a recoverable condition.
    pub fn add_fill(&mut self, fill_quantity: Quantity, timestamp: i64) {
        let new_filled = self.filled_quantity + fill_quantity;
        assert!(
            new_filled <= self.original_quantity,
            "Fill would exceed order quantity"
        );

        self.filled_quantity = new_filled;
        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
        self.updated_at = timestamp;

        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Cancel the order
    ///
    /// # Panics
    /// Panics if order is already in a terminal state; the caller checks
    /// terminality first and reports `AlreadyTerminal` to the client.
    pub fn cancel(&mut self, timestamp: i64) {
        assert!(!self.status.is_terminal(), "Cannot cancel terminal order");
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
    }

    /// Expire the order (implicit cancellation at the deadline)
    ///
    /// # Panics
    /// Panics if order is already in a terminal state.
    pub fn expire(&mut self, timestamp: i64) {
        assert!(!self.status.is_terminal(), "Cannot expire terminal order");
        self.status = OrderStatus::Expired;
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_limit_buy(qty: u64) -> Order {
        Order::new(
            InstrumentId::new("PROP-0042"),
            TraderId::new(),
            Side::Buy,
            OrderKind::Limit(Price::from_u64(5)),
            Quantity::from_u64(qty),
            1_708_123_456_789_000_000,
            None,
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_creation() {
        let order = new_limit_buy(10);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining_quantity(), Quantity::from_u64(10));
        assert!(order.check_invariant());
        assert!(!order.has_fills());
    }

    #[test]
    fn test_market_order_has_no_price() {
        let order = Order::new(
            InstrumentId::new("PROP-0042"),
            TraderId::new(),
            Side::Sell,
            OrderKind::Market,
            Quantity::from_u64(3),
            1_708_123_456_789_000_000,
            None,
        );
        assert_eq!(order.limit_price(), None);
    }

    #[test]
    fn test_order_fill_transitions() {
        let mut order = new_limit_buy(10);

        order.add_fill(Quantity::from_u64(4), 1_708_123_456_790_000_000);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), Quantity::from_u64(6));

        order.add_fill(Quantity::from_u64(6), 1_708_123_456_791_000_000);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.status.is_terminal());
        assert_eq!(order.remaining_quantity(), Quantity::zero());
    }

    #[test]
    #[should_panic(expected = "Fill would exceed order quantity")]
    fn test_order_overfill_panics() {
        let mut order = new_limit_buy(10);
        order.add_fill(Quantity::from_u64(11), 1_708_123_456_790_000_000);
    }

    #[test]
    fn test_order_cancel() {
        let mut order = new_limit_buy(10);
        order.cancel(1_708_123_456_790_000_000);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.status.is_terminal());
    }

    #[test]
    #[should_panic(expected = "Cannot cancel terminal order")]
    fn test_cancel_terminal_panics() {
        let mut order = new_limit_buy(10);
        order.add_fill(Quantity::from_u64(10), 1_708_123_456_790_000_000);
        order.cancel(1_708_123_456_791_000_000);
    }

    #[test]
    fn test_expiry_check() {
        let mut order = new_limit_buy(10);
        order.expires_at = Some(100);
        assert!(order.is_expired_at(100));
        assert!(order.is_expired_at(200));
        assert!(!order.is_expired_at(99));

        order.expire(200);
        assert_eq!(order.status, OrderStatus::Expired);
    }

    #[test]
    fn test_order_serialization() {
        let order = new_limit_buy(10);
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
