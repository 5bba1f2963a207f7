//! Ledger Service
//!
//! The sole owner of balance truth: per-trader cash and per-(trader,
//! instrument) token positions, each split into a total and a reserved
//! portion. Open sell orders reserve tokens; open buy orders reserve
//! cash notional.
//!
//! **Key invariants (checked after every mutation):**
//! - `owned − reserved ≥ 0` for every token position
//! - `cash_balance − reserved_cash ≥ 0` for every trader
//! - Total token supply per instrument is conserved across trades
//!
//! Pure data + invariant logic; no I/O.

pub mod balances;
pub mod ledger;

pub use balances::{CashAccount, TokenPosition};
pub use ledger::{BalanceView, Ledger, PositionView, Reservation};
