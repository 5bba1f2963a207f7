//! Durable event taxonomy
//!
//! Every state change that must survive a crash is journaled as one of
//! these events. Replay applies events; it never re-runs matching, so a
//! replayed log reproduces the exact same books, ledger, and trade
//! sequences.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, OrderId, TradeId, TraderId};
use types::instrument::Instrument;
use types::numeric::Quantity;
use types::order::Order;
use types::trade::Trade;

/// What an accepted order earmarked in the ledger
///
/// Serialized alongside the acceptance so replay restores the exact
/// reservation, including the walked cost of a market buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservedFunds {
    Tokens { quantity: Quantity },
    Cash { notional: Decimal },
}

/// One durable event in the exchange log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeEvent {
    /// A new instrument was listed
    InstrumentListed { instrument: Instrument },

    /// Cash arrived from the external balance source
    CashDeposited {
        trader_id: TraderId,
        amount: Decimal,
        timestamp: i64,
    },

    /// Tokens arrived from the external balance source
    TokensGranted {
        trader_id: TraderId,
        instrument_id: InstrumentId,
        quantity: Quantity,
        timestamp: i64,
    },

    /// An order passed validation and reservation (pre-match state)
    OrderAccepted {
        order: Order,
        reserved: ReservedFunds,
    },

    /// A limit remainder was placed on the book
    OrderRested {
        instrument_id: InstrumentId,
        order_id: OrderId,
    },

    /// A match was executed and ledger-confirmed
    TradeExecuted { trade: Trade },

    /// An order was cancelled (by the trader, or a market remainder)
    OrderCancelled {
        instrument_id: InstrumentId,
        order_id: OrderId,
        timestamp: i64,
    },

    /// An order passed its deadline and was expired
    OrderExpired {
        instrument_id: InstrumentId,
        order_id: OrderId,
        timestamp: i64,
    },

    /// The settlement collaborator confirmed a trade on-chain
    TradeChainConfirmed {
        instrument_id: InstrumentId,
        trade_id: TradeId,
        timestamp: i64,
    },

    /// The settlement collaborator reported permanent failure; the
    /// trade's balance effects were compensated
    TradeReversed {
        instrument_id: InstrumentId,
        trade_id: TradeId,
        timestamp: i64,
    },
}

impl ExchangeEvent {
    /// Stable event-kind tag stored in each journal frame
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeEvent::InstrumentListed { .. } => "InstrumentListed",
            ExchangeEvent::CashDeposited { .. } => "CashDeposited",
            ExchangeEvent::TokensGranted { .. } => "TokensGranted",
            ExchangeEvent::OrderAccepted { .. } => "OrderAccepted",
            ExchangeEvent::OrderRested { .. } => "OrderRested",
            ExchangeEvent::TradeExecuted { .. } => "TradeExecuted",
            ExchangeEvent::OrderCancelled { .. } => "OrderCancelled",
            ExchangeEvent::OrderExpired { .. } => "OrderExpired",
            ExchangeEvent::TradeChainConfirmed { .. } => "TradeChainConfirmed",
            ExchangeEvent::TradeReversed { .. } => "TradeReversed",
        }
    }

    /// The instrument this event belongs to, if any
    pub fn instrument_id(&self) -> Option<&InstrumentId> {
        match self {
            ExchangeEvent::InstrumentListed { instrument } => Some(&instrument.id),
            ExchangeEvent::CashDeposited { .. } => None,
            ExchangeEvent::TokensGranted { instrument_id, .. } => Some(instrument_id),
            ExchangeEvent::OrderAccepted { order, .. } => Some(&order.instrument_id),
            ExchangeEvent::OrderRested { instrument_id, .. } => Some(instrument_id),
            ExchangeEvent::TradeExecuted { trade } => Some(&trade.instrument_id),
            ExchangeEvent::OrderCancelled { instrument_id, .. } => Some(instrument_id),
            ExchangeEvent::OrderExpired { instrument_id, .. } => Some(instrument_id),
            ExchangeEvent::TradeChainConfirmed { instrument_id, .. } => Some(instrument_id),
            ExchangeEvent::TradeReversed { instrument_id, .. } => Some(instrument_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::Price;
    use types::order::{OrderKind, Side};

    #[test]
    fn test_event_bincode_roundtrip() {
        let order = Order::new(
            InstrumentId::new("PROP-0042"),
            TraderId::new(),
            Side::Buy,
            OrderKind::Limit(Price::from_u64(5)),
            Quantity::from_u64(10),
            1_708_123_456_789_000_000,
            None,
        );
        let event = ExchangeEvent::OrderAccepted {
            order,
            reserved: ReservedFunds::Cash {
                notional: Decimal::from(50),
            },
        };

        let bytes = bincode::serialize(&event).unwrap();
        let back: ExchangeEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_market_order_bincode_roundtrip() {
        let order = Order::new(
            InstrumentId::new("PROP-0042"),
            TraderId::new(),
            Side::Buy,
            OrderKind::Market,
            Quantity::from_u64(10),
            1_708_123_456_789_000_000,
            Some(1_708_123_456_799_000_000),
        );
        let event = ExchangeEvent::OrderAccepted {
            order,
            reserved: ReservedFunds::Tokens {
                quantity: Quantity::from_u64(10),
            },
        };

        let bytes = bincode::serialize(&event).unwrap();
        let back: ExchangeEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_event_kind_tags() {
        let event = ExchangeEvent::OrderCancelled {
            instrument_id: InstrumentId::new("PROP-0042"),
            order_id: OrderId::new(),
            timestamp: 0,
        };
        assert_eq!(event.kind(), "OrderCancelled");
        assert!(event.instrument_id().is_some());
    }
}
