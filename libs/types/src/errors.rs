//! Error taxonomy for the marketplace core
//!
//! Comprehensive error taxonomy using thiserror. Validation and balance
//! errors carry no side effects and are returned synchronously;
//! invariant violations are fatal for the affected instrument and are
//! never recovered automatically.

use crate::ids::{InstrumentId, OrderId};
use crate::order::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors rejecting an order submission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Unknown instrument: {instrument_id}")]
    UnknownInstrument { instrument_id: InstrumentId },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Instrument {instrument_id} is halted pending operator review")]
    InstrumentHalted { instrument_id: InstrumentId },
}

/// Errors rejecting a cancellation request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CancelError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: OrderId },

    #[error("Order {order_id} belongs to another trader")]
    Forbidden { order_id: OrderId },

    #[error("Order {order_id} already in terminal state {status:?}")]
    AlreadyTerminal {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Instrument {instrument_id} is halted pending operator review")]
    InstrumentHalted { instrument_id: InstrumentId },
}

/// Errors from ledger mutations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// The atomicity guarantees were violated somewhere upstream; the
    /// affected instrument must be halted for operator intervention.
    #[error("Ledger invariant violation: {detail}")]
    InvariantViolation { detail: String },
}

impl LedgerError {
    /// Convert a reservation failure into its order-level rejection.
    ///
    /// Only `InsufficientBalance` has an order-level shape; an invariant
    /// violation is fatal and must halt the instrument instead.
    pub fn as_rejection(&self) -> Option<OrderError> {
        match self {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => Some(OrderError::InsufficientBalance {
                required: *required,
                available: *available,
            }),
            LedgerError::InvariantViolation { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("not tick aligned".to_string());
        assert_eq!(err.to_string(), "Invalid price: not tick aligned");
    }

    #[test]
    fn test_insufficient_balance_fields() {
        let err = LedgerError::InsufficientBalance {
            required: Decimal::from(200),
            available: Decimal::from(150),
        };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("150"));
    }

    #[test]
    fn test_ledger_error_maps_to_order_error() {
        let ledger_err = LedgerError::InsufficientBalance {
            required: Decimal::from(10),
            available: Decimal::ZERO,
        };
        assert!(matches!(
            ledger_err.as_rejection(),
            Some(OrderError::InsufficientBalance { .. })
        ));

        let fatal = LedgerError::InvariantViolation {
            detail: "reserved below zero".into(),
        };
        assert!(fatal.as_rejection().is_none());
    }

    #[test]
    fn test_cancel_error_display() {
        let id = OrderId::new();
        let err = CancelError::Forbidden { order_id: id };
        assert!(err.to_string().contains(&id.to_string()));
    }
}
