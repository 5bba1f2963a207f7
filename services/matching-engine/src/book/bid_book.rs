//! Bid (buy-side) order book
//!
//! Maintains resting buy orders sorted by price descending (best bid
//! first). Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::ids::{OrderId, TraderId};
use types::numeric::{Price, Quantity};

use super::price_level::{LevelEntry, PriceLevel};

/// Bid (buy) side of the book
///
/// The highest price is the best bid. At each price level, orders are
/// maintained in FIFO order.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Rest an order at its price level
    pub fn insert(&mut self, price: Price, entry: LevelEntry) {
        self.levels.entry(price).or_default().insert(entry);
    }

    /// Remove a resting order, deleting the level if it empties
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Reduce a resting order after a partial fill, deleting the level
    /// if it empties
    pub fn reduce(&mut self, order_id: &OrderId, price: Price, quantity: Quantity) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let reduced = level.reduce(order_id, quantity);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        reduced
    }

    /// Highest resting bid price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Earliest resting order not owned by the given trader, scanning
    /// levels best-first
    pub fn first_eligible(&self, taker: TraderId) -> Option<(Price, LevelEntry)> {
        self.levels
            .iter()
            .rev()
            .find_map(|(price, level)| level.first_not_owned_by(taker).map(|e| (*price, e)))
    }

    /// Iterate levels best-first (highest price first)
    pub fn levels_best_first(&self) -> impl Iterator<Item = (Price, &PriceLevel)> {
        self.levels.iter().rev().map(|(price, level)| (*price, level))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
