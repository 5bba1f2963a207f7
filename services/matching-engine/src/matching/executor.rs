//! Trade construction with per-instrument sequencing
//!
//! Assigns monotonically increasing sequence numbers to trades within
//! one instrument; the sequence derives time priority for downstream
//! consumers and anchors replay/audit ordering.

use types::ids::{InstrumentId, OrderId, TraderId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// Builds trades and hands out the instrument's trade sequence
pub struct TradeExecutor {
    instrument_id: InstrumentId,
    sequence_counter: u64,
}

impl TradeExecutor {
    /// Create an executor starting at the given sequence number
    pub fn new(instrument_id: InstrumentId, starting_sequence: u64) -> Self {
        Self {
            instrument_id,
            sequence_counter: starting_sequence,
        }
    }

    /// The next sequence number that will be assigned
    pub fn next_sequence(&self) -> u64 {
        self.sequence_counter
    }

    /// Restore the sequence counter during recovery
    pub fn set_next_sequence(&mut self, sequence: u64) {
        self.sequence_counter = sequence;
    }

    /// Build a trade at the maker's price
    ///
    /// The buyer/seller roles are derived from the taker's side: a buy
    /// taker buys from the maker, a sell taker sells to the maker.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_trader: TraderId,
        taker_trader: TraderId,
        taker_side: Side,
        maker_price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Trade {
        let (buyer, seller) = match taker_side {
            Side::Buy => (taker_trader, maker_trader),
            Side::Sell => (maker_trader, taker_trader),
        };

        let sequence = self.sequence_counter;
        self.sequence_counter += 1;

        Trade::new(
            sequence,
            self.instrument_id.clone(),
            maker_order_id,
            taker_order_id,
            buyer,
            seller,
            taker_side,
            maker_price,
            quantity,
            timestamp,
        )
    }
}
