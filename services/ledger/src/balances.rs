//! Balance primitives: cash accounts and token positions
//!
//! Both track a total and a reserved portion. Reserving earmarks part of
//! the total for an open order; releasing gives it back; spending the
//! reserved portion consumes it at settlement. An attempt to release or
//! spend more than is reserved is an invariant violation, not a
//! user-facing error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::LedgerError;

/// A trader's cash balance with the portion reserved by open buy orders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashAccount {
    pub balance: Decimal,
    pub reserved: Decimal,
}

impl CashAccount {
    /// Cash not earmarked by any open order
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }

    /// Check invariant: 0 ≤ reserved ≤ balance
    pub fn check_invariant(&self) -> bool {
        self.reserved >= Decimal::ZERO && self.reserved <= self.balance
    }

    /// Earmark cash for an open buy order
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.available() {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available(),
            });
        }
        self.reserved += amount;
        Ok(())
    }

    /// Return an earmark after cancellation or expiry
    pub fn release(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.reserved {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "cash release of {} exceeds reserved {}",
                    amount, self.reserved
                ),
            });
        }
        self.reserved -= amount;
        Ok(())
    }

    /// Consume reserved cash at settlement (buyer pays)
    pub fn spend_reserved(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.reserved || amount > self.balance {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "cash spend of {} exceeds reserved {} or balance {}",
                    amount, self.reserved, self.balance
                ),
            });
        }
        self.reserved -= amount;
        self.balance -= amount;
        Ok(())
    }

    /// Add unreserved cash (seller proceeds, deposits, reversals)
    pub fn credit(&mut self, amount: Decimal) {
        self.balance += amount;
    }

    /// Remove unreserved cash (reversal of seller proceeds)
    pub fn debit_available(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.available() {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "cash debit of {} exceeds available {}",
                    amount,
                    self.available()
                ),
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

/// A trader's holding of one instrument with the portion reserved by
/// open sell orders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPosition {
    pub owned: Decimal,
    pub reserved: Decimal,
}

impl TokenPosition {
    /// Tokens not earmarked by any open sell order
    pub fn available(&self) -> Decimal {
        self.owned - self.reserved
    }

    /// Check invariant: 0 ≤ reserved ≤ owned
    pub fn check_invariant(&self) -> bool {
        self.reserved >= Decimal::ZERO && self.reserved <= self.owned
    }

    /// Earmark tokens for an open sell order
    pub fn reserve(&mut self, quantity: Decimal) -> Result<(), LedgerError> {
        if quantity > self.available() {
            return Err(LedgerError::InsufficientBalance {
                required: quantity,
                available: self.available(),
            });
        }
        self.reserved += quantity;
        Ok(())
    }

    /// Return an earmark after cancellation or expiry
    pub fn release(&mut self, quantity: Decimal) -> Result<(), LedgerError> {
        if quantity > self.reserved {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "token release of {} exceeds reserved {}",
                    quantity, self.reserved
                ),
            });
        }
        self.reserved -= quantity;
        Ok(())
    }

    /// Consume reserved tokens at settlement (seller delivers)
    pub fn spend_reserved(&mut self, quantity: Decimal) -> Result<(), LedgerError> {
        if quantity > self.reserved || quantity > self.owned {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "token spend of {} exceeds reserved {} or owned {}",
                    quantity, self.reserved, self.owned
                ),
            });
        }
        self.reserved -= quantity;
        self.owned -= quantity;
        Ok(())
    }

    /// Add unreserved tokens (buyer receives, seeding, reversals)
    pub fn credit(&mut self, quantity: Decimal) {
        self.owned += quantity;
    }

    /// Remove unreserved tokens (reversal of a buyer's receipt)
    pub fn debit_available(&mut self, quantity: Decimal) -> Result<(), LedgerError> {
        if quantity > self.available() {
            return Err(LedgerError::InvariantViolation {
                detail: format!(
                    "token debit of {} exceeds available {}",
                    quantity,
                    self.available()
                ),
            });
        }
        self.owned -= quantity;
        Ok(())
    }

    /// Whether the position holds nothing at all
    pub fn is_empty(&self) -> bool {
        self.owned.is_zero() && self.reserved.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cash(balance: u64) -> CashAccount {
        CashAccount {
            balance: Decimal::from(balance),
            reserved: Decimal::ZERO,
        }
    }

    fn tokens(owned: u64) -> TokenPosition {
        TokenPosition {
            owned: Decimal::from(owned),
            reserved: Decimal::ZERO,
        }
    }

    #[test]
    fn test_cash_reserve_release() {
        let mut acct = cash(1000);
        acct.reserve(Decimal::from(300)).unwrap();
        assert_eq!(acct.available(), Decimal::from(700));
        assert!(acct.check_invariant());

        acct.release(Decimal::from(100)).unwrap();
        assert_eq!(acct.available(), Decimal::from(800));
        assert!(acct.check_invariant());
    }

    #[test]
    fn test_cash_reserve_insufficient() {
        let mut acct = cash(100);
        let err = acct.reserve(Decimal::from(150)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        // No mutation on failure
        assert_eq!(acct.reserved, Decimal::ZERO);
    }

    #[test]
    fn test_cash_over_release_is_invariant_violation() {
        let mut acct = cash(100);
        acct.reserve(Decimal::from(50)).unwrap();
        let err = acct.release(Decimal::from(60)).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    #[test]
    fn test_cash_spend_reserved() {
        let mut acct = cash(1000);
        acct.reserve(Decimal::from(300)).unwrap();
        acct.spend_reserved(Decimal::from(200)).unwrap();

        assert_eq!(acct.balance, Decimal::from(800));
        assert_eq!(acct.reserved, Decimal::from(100));
        assert!(acct.check_invariant());
    }

    #[test]
    fn test_token_reserve_spend() {
        let mut pos = tokens(100);
        pos.reserve(Decimal::from(100)).unwrap();
        pos.spend_reserved(Decimal::from(40)).unwrap();

        assert_eq!(pos.owned, Decimal::from(60));
        assert_eq!(pos.reserved, Decimal::from(60));
        assert!(pos.check_invariant());
    }

    #[test]
    fn test_token_reserve_insufficient() {
        let mut pos = tokens(10);
        pos.reserve(Decimal::from(8)).unwrap();
        let err = pos.reserve(Decimal::from(5)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(pos.reserved, Decimal::from(8));
    }

    #[test]
    fn test_token_debit_available() {
        let mut pos = tokens(10);
        pos.reserve(Decimal::from(6)).unwrap();
        // Only 4 available
        assert!(pos.debit_available(Decimal::from(5)).is_err());
        pos.debit_available(Decimal::from(4)).unwrap();
        assert_eq!(pos.owned, Decimal::from(6));
    }
}
