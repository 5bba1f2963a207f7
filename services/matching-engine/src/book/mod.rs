//! Order book for a single instrument
//!
//! Two price-ordered sides of resting limit orders plus the aggregate
//! queries the market reads: best bid/ask, spread, mid price, and depth.
//! Empty price levels are deleted, never left as zero entries.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::{LevelEntry, PriceLevel};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, OrderId, TraderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

/// One aggregated price level as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub total_amount: Decimal,
    pub order_count: u32,
}

/// Aggregated top-of-book view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub instrument_id: InstrumentId,
    /// Best bid first (price descending)
    pub bids: Vec<DepthLevel>,
    /// Best ask first (price ascending)
    pub asks: Vec<DepthLevel>,
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
}

/// The resting-order book of one instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    bids: BidBook,
    asks: AskBook,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: BidBook::new(),
            asks: AskBook::new(),
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    /// Highest resting buy price
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Lowest resting sell price
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// best_ask − best_bid; undefined while either side is empty
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.as_decimal() - self.best_bid()?.as_decimal())
    }

    /// Midpoint of best bid and ask; undefined while either side is empty
    pub fn mid_price(&self) -> Option<Decimal> {
        let two = Decimal::from(2);
        Some((self.best_ask()?.as_decimal() + self.best_bid()?.as_decimal()) / two)
    }

    /// Rest a limit order's remaining quantity at its price level
    ///
    /// # Panics
    /// Panics on market orders; they never rest.
    pub fn insert_resting(&mut self, order: &Order) {
        let price = order
            .limit_price()
            .expect("market orders never rest on the book");
        let entry = LevelEntry {
            order_id: order.id,
            trader_id: order.trader_id,
            remaining_quantity: order.remaining_quantity(),
            expires_at: order.expires_at,
        };
        match order.side {
            Side::Buy => self.bids.insert(price, entry),
            Side::Sell => self.asks.insert(price, entry),
        }
    }

    /// Remove a resting order (fill-to-zero, cancel, expiry)
    pub fn remove_resting(&mut self, order_id: &OrderId, side: Side, price: Price) -> Option<Quantity> {
        match side {
            Side::Buy => self.bids.remove(order_id, price),
            Side::Sell => self.asks.remove(order_id, price),
        }
    }

    /// Reduce a resting order after a partial fill
    pub fn reduce_resting(
        &mut self,
        order_id: &OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> bool {
        match side {
            Side::Buy => self.bids.reduce(order_id, price, quantity),
            Side::Sell => self.asks.reduce(order_id, price, quantity),
        }
    }

    /// The best-priced, earliest resting order on the side opposing the
    /// taker that does not belong to the taker
    pub fn first_eligible_maker(
        &self,
        taker_side: Side,
        taker_trader: TraderId,
    ) -> Option<(Price, LevelEntry)> {
        match taker_side {
            Side::Buy => self.asks.first_eligible(taker_trader),
            Side::Sell => self.bids.first_eligible(taker_trader),
        }
    }

    /// Exact cost of filling `quantity` against the current ask side,
    /// skipping the given trader's own orders and already-expired makers
    ///
    /// Returns (fillable quantity, notional cost). Used to size the cash
    /// reservation of a market buy before matching begins.
    pub fn cost_to_fill_buy(
        &self,
        quantity: Quantity,
        exclude: TraderId,
        now: i64,
    ) -> (Quantity, Decimal) {
        let mut needed = quantity.as_decimal();
        let mut fillable = Decimal::ZERO;
        let mut cost = Decimal::ZERO;

        'levels: for (price, level) in self.asks.levels_best_first() {
            for entry in level.iter() {
                if needed.is_zero() {
                    break 'levels;
                }
                if entry.trader_id == exclude {
                    continue;
                }
                if matches!(entry.expires_at, Some(deadline) if deadline <= now) {
                    continue;
                }
                let take = needed.min(entry.remaining_quantity.as_decimal());
                fillable += take;
                cost += take * price.as_decimal();
                needed -= take;
            }
        }

        let fillable = Quantity::try_new(fillable).unwrap_or(Quantity::zero());
        (fillable, cost)
    }

    /// Top-N aggregated levels per side plus spread and mid price
    pub fn depth(&self, levels: usize) -> DepthSnapshot {
        let bids = self
            .bids
            .levels_best_first()
            .take(levels)
            .map(|(price, level)| DepthLevel {
                price,
                total_amount: level.total_quantity().as_decimal(),
                order_count: level.order_count() as u32,
            })
            .collect();
        let asks = self
            .asks
            .levels_best_first()
            .take(levels)
            .map(|(price, level)| DepthLevel {
                price,
                total_amount: level.total_quantity().as_decimal(),
                order_count: level.order_count() as u32,
            })
            .collect();

        DepthSnapshot {
            instrument_id: self.instrument_id.clone(),
            bids,
            asks,
            spread: self.spread(),
            mid_price: self.mid_price(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::OrderKind;

    fn resting(side: Side, price: u64, qty: u64) -> Order {
        Order::new(
            InstrumentId::new("PROP-0042"),
            TraderId::new(),
            side,
            OrderKind::Limit(Price::from_u64(price)),
            Quantity::from_u64(qty),
            1_708_123_456_789_000_000,
            None,
        )
    }

    #[test]
    fn test_spread_and_mid() {
        let mut book = OrderBook::new(InstrumentId::new("PROP-0042"));
        assert_eq!(book.spread(), None);

        book.insert_resting(&resting(Side::Buy, 48, 10));
        book.insert_resting(&resting(Side::Sell, 52, 10));

        assert_eq!(book.spread(), Some(Decimal::from(4)));
        assert_eq!(book.mid_price(), Some(Decimal::from(50)));
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut book = OrderBook::new(InstrumentId::new("PROP-0042"));
        book.insert_resting(&resting(Side::Sell, 50, 10));
        book.insert_resting(&resting(Side::Sell, 50, 5));
        book.insert_resting(&resting(Side::Sell, 51, 3));

        let depth = book.depth(10);
        assert_eq!(depth.asks.len(), 2);
        assert_eq!(depth.asks[0].price, Price::from_u64(50));
        assert_eq!(depth.asks[0].total_amount, Decimal::from(15));
        assert_eq!(depth.asks[0].order_count, 2);
        assert_eq!(depth.asks[1].total_amount, Decimal::from(3));
    }

    #[test]
    fn test_cost_to_fill_walks_levels() {
        let mut book = OrderBook::new(InstrumentId::new("PROP-0042"));
        book.insert_resting(&resting(Side::Sell, 50, 4));
        book.insert_resting(&resting(Side::Sell, 51, 10));

        let (fillable, cost) =
            book.cost_to_fill_buy(Quantity::from_u64(10), TraderId::new(), 0);
        assert_eq!(fillable, Quantity::from_u64(10));
        // 4 @ 50 + 6 @ 51
        assert_eq!(cost, Decimal::from(4 * 50 + 6 * 51));
    }

    #[test]
    fn test_cost_to_fill_excludes_own_and_expired() {
        let mut book = OrderBook::new(InstrumentId::new("PROP-0042"));
        let own = TraderId::new();

        let mut own_order = resting(Side::Sell, 49, 5);
        own_order.trader_id = own;
        book.insert_resting(&own_order);

        let mut expired = resting(Side::Sell, 50, 5);
        expired.expires_at = Some(100);
        book.insert_resting(&expired);

        book.insert_resting(&resting(Side::Sell, 51, 5));

        let (fillable, cost) = book.cost_to_fill_buy(Quantity::from_u64(10), own, 200);
        assert_eq!(fillable, Quantity::from_u64(5));
        assert_eq!(cost, Decimal::from(5 * 51));
    }

    #[test]
    fn test_partial_depth_when_book_thin() {
        let mut book = OrderBook::new(InstrumentId::new("PROP-0042"));
        book.insert_resting(&resting(Side::Sell, 50, 3));

        let (fillable, cost) =
            book.cost_to_fill_buy(Quantity::from_u64(10), TraderId::new(), 0);
        assert_eq!(fillable, Quantity::from_u64(3));
        assert_eq!(cost, Decimal::from(150));
    }
}
