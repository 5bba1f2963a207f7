//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at a specific price point,
//! in arrival order. Entries carry the owning trader (so matching can
//! skip a taker's own orders) and the expiry deadline (so matching can
//! expire stale makers in place).

use std::collections::VecDeque;
use types::ids::{OrderId, TraderId};
use types::numeric::Quantity;

/// One resting order's footprint at a price level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub remaining_quantity: Quantity,
    pub expires_at: Option<i64>,
}

/// A price level containing orders at a specific price
///
/// Maintains strict FIFO ordering for time-priority matching.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    orders: VecDeque<LevelEntry>,
    total_quantity: Quantity,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    /// Append an order at the back of the queue (time priority)
    pub fn insert(&mut self, entry: LevelEntry) {
        self.total_quantity = self.total_quantity + entry.remaining_quantity;
        self.orders.push_back(entry);
    }

    /// Remove an order by id, returning its remaining quantity
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|e| &e.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total_quantity = self
            .total_quantity
            .checked_sub(entry.remaining_quantity)
            .unwrap_or(Quantity::zero());
        Some(entry.remaining_quantity)
    }

    /// The earliest entry not owned by the given trader
    ///
    /// Matching uses this to honor time priority while skipping the
    /// taker's own resting orders.
    pub fn first_not_owned_by(&self, trader_id: TraderId) -> Option<LevelEntry> {
        self.orders
            .iter()
            .find(|e| e.trader_id != trader_id)
            .cloned()
    }

    /// Reduce an entry's remaining quantity after a partial fill
    ///
    /// Removes the entry when it reaches zero. Returns false if the
    /// order is not at this level.
    pub fn reduce(&mut self, order_id: &OrderId, fill_quantity: Quantity) -> bool {
        let Some(position) = self.orders.iter().position(|e| &e.order_id == order_id) else {
            return false;
        };

        let entry = &mut self.orders[position];
        let new_remaining = entry
            .remaining_quantity
            .checked_sub(fill_quantity)
            .unwrap_or(Quantity::zero());

        if new_remaining.is_zero() {
            self.orders.remove(position);
        } else {
            entry.remaining_quantity = new_remaining;
        }

        self.total_quantity = self
            .total_quantity
            .checked_sub(fill_quantity)
            .unwrap_or(Quantity::zero());
        true
    }

    /// Iterate entries in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &LevelEntry> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
