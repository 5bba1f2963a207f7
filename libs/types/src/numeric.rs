//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). `Price` is strictly positive; `Quantity` is non-negative.
//! Construction goes through validating constructors so that a value of
//! either type is valid by construction.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Add;
use thiserror::Error;

/// Numeric construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Price must be strictly positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Quantity must be non-negative, got {0}")]
    NegativeQuantity(Decimal),

    #[error("Failed to parse decimal: {0}")]
    Parse(String),
}

/// A strictly positive execution or limit price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Price(Decimal);

// Deserialization validates, so wire input cannot smuggle in a
// non-positive price
impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Price::try_new(value).ok_or_else(|| {
            serde::de::Error::custom(format!("price must be strictly positive, got {}", value))
        })
    }
}

impl Price {
    /// Try to create a price; None if not strictly positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create from an integer value
    ///
    /// # Panics
    /// Panics if `value` is zero
    pub fn from_u64(value: u64) -> Self {
        Self::try_new(Decimal::from(value)).expect("Price must be strictly positive")
    }

    /// Parse from a decimal string
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let dec: Decimal = s.parse().map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(dec).ok_or(NumericError::NonPositivePrice(dec))
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Check whether this price is an exact multiple of the given tick size
    pub fn is_multiple_of(&self, tick: Price) -> bool {
        (self.0 % tick.0).is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative token quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Quantity::try_new(value).ok_or_else(|| {
            serde::de::Error::custom(format!("quantity must be non-negative, got {}", value))
        })
    }
}

impl Quantity {
    /// The zero quantity
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Try to create a quantity; None if negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create from an integer value
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let dec: Decimal = s.parse().map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(dec).ok_or(NumericError::NegativeQuantity(dec))
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Check if the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract, returning None if the result would be negative
    pub fn checked_sub(&self, other: Quantity) -> Option<Self> {
        Self::try_new(self.0 - other.0)
    }

    /// The smaller of two quantities
    pub fn min(self, other: Quantity) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Check whether this quantity is an exact multiple of the given lot size
    pub fn is_multiple_of(&self, lot: Quantity) -> bool {
        !lot.is_zero() && (self.0 % lot.0).is_zero()
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notional value of a fill: price × quantity
pub fn notional(price: Price, quantity: Quantity) -> Decimal {
    price.as_decimal() * quantity.as_decimal()
}
