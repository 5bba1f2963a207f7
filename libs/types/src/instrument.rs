//! Tradable instrument definitions
//!
//! An instrument is the token representing fractional ownership of one
//! property. Supply is fixed at listing; tick size and lot size bound
//! the prices and quantities orders may carry. Immutable after creation.

use crate::ids::InstrumentId;
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// A listed property token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    /// Fixed total token supply across all holders
    pub total_supply: Quantity,
    /// Minimum price increment
    pub tick_size: Price,
    /// Minimum quantity increment
    pub lot_size: Quantity,
    pub listed_at: i64,
}

impl Instrument {
    pub fn new(
        id: InstrumentId,
        total_supply: Quantity,
        tick_size: Price,
        lot_size: Quantity,
        listed_at: i64,
    ) -> Self {
        Self {
            id,
            total_supply,
            tick_size,
            lot_size,
            listed_at,
        }
    }

    /// Check that a limit price is a positive multiple of the tick size
    pub fn price_aligned(&self, price: Price) -> bool {
        price.is_multiple_of(self.tick_size)
    }

    /// Check that an order quantity is a positive multiple of the lot size
    pub fn quantity_aligned(&self, quantity: Quantity) -> bool {
        !quantity.is_zero() && quantity.is_multiple_of(self.lot_size)
    }
}
