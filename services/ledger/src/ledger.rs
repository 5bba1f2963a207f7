//! The ledger: per-trader accounts behind per-trader locks
//!
//! All mutations for one trader go through that trader's mutex — this is
//! the lock that serializes cross-instrument cash contention, since a
//! trader's buy orders on different instruments are processed by
//! different instrument workers. Settlement touches two traders and
//! takes both locks in sorted-id order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use types::errors::LedgerError;
use types::ids::{InstrumentId, TraderId};
use types::numeric::{notional, Price, Quantity};

use crate::balances::{CashAccount, TokenPosition};

/// What an open order earmarks: tokens for a sell, cash for a buy
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    Tokens {
        instrument_id: InstrumentId,
        quantity: Quantity,
    },
    Cash {
        notional: Decimal,
    },
}

impl Reservation {
    /// Tokens earmarked by a sell order's remaining quantity
    pub fn tokens(instrument_id: InstrumentId, quantity: Quantity) -> Self {
        Reservation::Tokens {
            instrument_id,
            quantity,
        }
    }

    /// Cash earmarked by a buy order's remaining notional
    pub fn cash(amount: Decimal) -> Self {
        Reservation::Cash { notional: amount }
    }
}

#[derive(Debug, Default)]
struct TraderAccount {
    cash: CashAccount,
    positions: BTreeMap<InstrumentId, TokenPosition>,
}

/// Read-only view of one token position
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PositionView {
    pub instrument_id: InstrumentId,
    pub owned: Decimal,
    pub reserved: Decimal,
}

/// Read-only view of one trader's balances
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BalanceView {
    pub trader_id: TraderId,
    pub cash_balance: Decimal,
    pub reserved_cash: Decimal,
    pub positions: Vec<PositionView>,
}

/// The balance ledger shared by all instrument workers
#[derive(Default)]
pub struct Ledger {
    accounts: DashMap<TraderId, Arc<Mutex<TraderAccount>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    fn account(&self, trader: TraderId) -> Arc<Mutex<TraderAccount>> {
        self.accounts
            .entry(trader)
            .or_insert_with(|| Arc::new(Mutex::new(TraderAccount::default())))
            .clone()
    }

    /// Credit unreserved cash (seeding from the balance source, recovery)
    pub fn credit_cash(&self, trader: TraderId, amount: Decimal) {
        let account = self.account(trader);
        let mut guard = account.lock().expect("trader lock poisoned");
        guard.cash.credit(amount);
    }

    /// Credit unreserved tokens (seeding from the balance source, recovery)
    pub fn credit_tokens(&self, trader: TraderId, instrument_id: &InstrumentId, quantity: Quantity) {
        let account = self.account(trader);
        let mut guard = account.lock().expect("trader lock poisoned");
        guard
            .positions
            .entry(instrument_id.clone())
            .or_default()
            .credit(quantity.as_decimal());
    }

    /// Atomically check-and-earmark balance for an order
    ///
    /// On failure returns `InsufficientBalance` and performs no mutation.
    pub fn reserve(&self, trader: TraderId, reservation: &Reservation) -> Result<(), LedgerError> {
        let account = self.account(trader);
        let mut guard = account.lock().expect("trader lock poisoned");
        match reservation {
            Reservation::Tokens {
                instrument_id,
                quantity,
            } => guard
                .positions
                .entry(instrument_id.clone())
                .or_default()
                .reserve(quantity.as_decimal()),
            Reservation::Cash { notional } => guard.cash.reserve(*notional),
        }
    }

    /// Return an earmark after cancellation or expiry of the unfilled
    /// remainder. Over-releasing is an invariant violation.
    pub fn release(&self, trader: TraderId, reservation: &Reservation) -> Result<(), LedgerError> {
        let account = self.account(trader);
        let mut guard = account.lock().expect("trader lock poisoned");
        match reservation {
            Reservation::Tokens {
                instrument_id,
                quantity,
            } => match guard.positions.get_mut(instrument_id) {
                Some(position) => position.release(quantity.as_decimal()),
                None => Err(LedgerError::InvariantViolation {
                    detail: format!(
                        "token release for {} with no position",
                        instrument_id
                    ),
                }),
            },
            Reservation::Cash { notional } => guard.cash.release(*notional),
        }
    }

    /// Apply the balance effects of a trade
    ///
    /// Seller delivers reserved tokens; buyer receives them and pays out
    /// of reserved cash; seller receives the proceeds. Both trader locks
    /// are held for the duration, acquired in sorted-id order.
    pub fn settle_trade(
        &self,
        buyer: TraderId,
        seller: TraderId,
        instrument_id: &InstrumentId,
        price: Price,
        quantity: Quantity,
    ) -> Result<(), LedgerError> {
        if buyer == seller {
            return Err(LedgerError::InvariantViolation {
                detail: "settlement between a trader and themselves".into(),
            });
        }

        let value = notional(price, quantity);
        let qty = quantity.as_decimal();

        let (buyer_account, seller_account) = (self.account(buyer), self.account(seller));
        let (mut buyer_guard, mut seller_guard) =
            lock_pair(buyer, &buyer_account, seller, &seller_account);

        seller_guard
            .positions
            .entry(instrument_id.clone())
            .or_default()
            .spend_reserved(qty)?;
        buyer_guard
            .positions
            .entry(instrument_id.clone())
            .or_default()
            .credit(qty);
        buyer_guard.cash.spend_reserved(value)?;
        seller_guard.cash.credit(value);

        debug!(
            %buyer, %seller, instrument = %instrument_id, %price, %quantity,
            "trade settled in ledger"
        );
        Ok(())
    }

    /// Compensating adjustment for a permanently failed settlement
    ///
    /// Tokens go back to the seller and cash back to the buyer, both into
    /// the unreserved portion — the originating orders are not
    /// resurrected. Fails with an invariant violation if either party no
    /// longer has the trade's proceeds available.
    pub fn reverse_trade(
        &self,
        buyer: TraderId,
        seller: TraderId,
        instrument_id: &InstrumentId,
        price: Price,
        quantity: Quantity,
    ) -> Result<(), LedgerError> {
        let value = notional(price, quantity);
        let qty = quantity.as_decimal();

        let (buyer_account, seller_account) = (self.account(buyer), self.account(seller));
        let (mut buyer_guard, mut seller_guard) =
            lock_pair(buyer, &buyer_account, seller, &seller_account);

        match buyer_guard.positions.get_mut(instrument_id) {
            Some(position) => position.debit_available(qty)?,
            None => {
                return Err(LedgerError::InvariantViolation {
                    detail: format!("trade reversal for {} with no buyer position", instrument_id),
                })
            }
        }
        seller_guard.cash.debit_available(value)?;
        seller_guard
            .positions
            .entry(instrument_id.clone())
            .or_default()
            .credit(qty);
        buyer_guard.cash.credit(value);

        debug!(
            %buyer, %seller, instrument = %instrument_id, %price, %quantity,
            "trade reversed in ledger"
        );
        Ok(())
    }

    /// Snapshot one trader's balances
    pub fn view(&self, trader: TraderId) -> Option<BalanceView> {
        let account = self.accounts.get(&trader)?.clone();
        let guard = account.lock().expect("trader lock poisoned");
        Some(Self::view_of(trader, &guard))
    }

    /// Snapshot every trader's balances (checkpointing)
    pub fn all_views(&self) -> Vec<BalanceView> {
        let mut views: Vec<BalanceView> = self
            .accounts
            .iter()
            .map(|entry| {
                let guard = entry.value().lock().expect("trader lock poisoned");
                Self::view_of(*entry.key(), &guard)
            })
            .collect();
        views.sort_by_key(|v| v.trader_id);
        views
    }

    /// Rebuild accounts from checkpoint views
    pub fn restore(&self, views: Vec<BalanceView>) {
        for view in views {
            let account = self.account(view.trader_id);
            let mut guard = account.lock().expect("trader lock poisoned");
            guard.cash = CashAccount {
                balance: view.cash_balance,
                reserved: view.reserved_cash,
            };
            guard.positions = view
                .positions
                .into_iter()
                .map(|p| {
                    (
                        p.instrument_id,
                        TokenPosition {
                            owned: p.owned,
                            reserved: p.reserved,
                        },
                    )
                })
                .collect();
        }
    }

    /// Total tokens of one instrument held across all traders
    pub fn instrument_total(&self, instrument_id: &InstrumentId) -> Decimal {
        self.accounts
            .iter()
            .map(|entry| {
                let guard = entry.value().lock().expect("trader lock poisoned");
                guard
                    .positions
                    .get(instrument_id)
                    .map(|p| p.owned)
                    .unwrap_or(Decimal::ZERO)
            })
            .sum()
    }

    fn view_of(trader: TraderId, account: &TraderAccount) -> BalanceView {
        BalanceView {
            trader_id: trader,
            cash_balance: account.cash.balance,
            reserved_cash: account.cash.reserved,
            positions: account
                .positions
                .iter()
                .filter(|(_, p)| !p.is_empty())
                .map(|(id, p)| PositionView {
                    instrument_id: id.clone(),
                    owned: p.owned,
                    reserved: p.reserved,
                })
                .collect(),
        }
    }
}

/// Lock two trader accounts in sorted-id order
fn lock_pair<'a>(
    a_id: TraderId,
    a: &'a Arc<Mutex<TraderAccount>>,
    b_id: TraderId,
    b: &'a Arc<Mutex<TraderAccount>>,
) -> (
    std::sync::MutexGuard<'a, TraderAccount>,
    std::sync::MutexGuard<'a, TraderAccount>,
) {
    if a_id < b_id {
        let a_guard = a.lock().expect("trader lock poisoned");
        let b_guard = b.lock().expect("trader lock poisoned");
        (a_guard, b_guard)
    } else {
        let b_guard = b.lock().expect("trader lock poisoned");
        let a_guard = a.lock().expect("trader lock poisoned");
        (a_guard, b_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst() -> InstrumentId {
        InstrumentId::new("PROP-0042")
    }

    #[test]
    fn test_reserve_tokens_requires_holding() {
        let ledger = Ledger::new();
        let trader = TraderId::new();

        let reservation = Reservation::tokens(inst(), Quantity::from_u64(10));
        assert!(matches!(
            ledger.reserve(trader, &reservation),
            Err(LedgerError::InsufficientBalance { .. })
        ));

        ledger.credit_tokens(trader, &inst(), Quantity::from_u64(100));
        ledger.reserve(trader, &reservation).unwrap();

        let view = ledger.view(trader).unwrap();
        assert_eq!(view.positions[0].reserved, Decimal::from(10));
    }

    #[test]
    fn test_reserve_cash_requires_balance() {
        let ledger = Ledger::new();
        let trader = TraderId::new();
        ledger.credit_cash(trader, Decimal::from(100));

        assert!(ledger
            .reserve(trader, &Reservation::cash(Decimal::from(150)))
            .is_err());
        ledger
            .reserve(trader, &Reservation::cash(Decimal::from(80)))
            .unwrap();

        let view = ledger.view(trader).unwrap();
        assert_eq!(view.reserved_cash, Decimal::from(80));
        assert_eq!(view.cash_balance, Decimal::from(100));
    }

    #[test]
    fn test_release_exact_remainder() {
        let ledger = Ledger::new();
        let trader = TraderId::new();
        ledger.credit_cash(trader, Decimal::from(1000));
        ledger
            .reserve(trader, &Reservation::cash(Decimal::from(500)))
            .unwrap();

        ledger
            .release(trader, &Reservation::cash(Decimal::from(300)))
            .unwrap();
        let view = ledger.view(trader).unwrap();
        assert_eq!(view.reserved_cash, Decimal::from(200));
    }

    #[test]
    fn test_over_release_is_fatal() {
        let ledger = Ledger::new();
        let trader = TraderId::new();
        ledger.credit_cash(trader, Decimal::from(100));
        ledger
            .reserve(trader, &Reservation::cash(Decimal::from(50)))
            .unwrap();

        let err = ledger
            .release(trader, &Reservation::cash(Decimal::from(60)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    #[test]
    fn test_settle_trade_moves_both_legs() {
        let ledger = Ledger::new();
        let seller = TraderId::new();
        let buyer = TraderId::new();

        ledger.credit_tokens(seller, &inst(), Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));

        // Seller rests 100 tokens, buyer reserves 200 cash for 40 @ 5
        ledger
            .reserve(seller, &Reservation::tokens(inst(), Quantity::from_u64(100)))
            .unwrap();
        ledger
            .reserve(buyer, &Reservation::cash(Decimal::from(200)))
            .unwrap();

        ledger
            .settle_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(40))
            .unwrap();

        let seller_view = ledger.view(seller).unwrap();
        assert_eq!(seller_view.cash_balance, Decimal::from(200));
        assert_eq!(seller_view.positions[0].owned, Decimal::from(60));
        assert_eq!(seller_view.positions[0].reserved, Decimal::from(60));

        let buyer_view = ledger.view(buyer).unwrap();
        assert_eq!(buyer_view.cash_balance, Decimal::from(800));
        assert_eq!(buyer_view.reserved_cash, Decimal::ZERO);
        assert_eq!(buyer_view.positions[0].owned, Decimal::from(40));
    }

    #[test]
    fn test_settle_trade_conserves_supply() {
        let ledger = Ledger::new();
        let seller = TraderId::new();
        let buyer = TraderId::new();

        ledger.credit_tokens(seller, &inst(), Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));
        ledger
            .reserve(seller, &Reservation::tokens(inst(), Quantity::from_u64(100)))
            .unwrap();
        ledger
            .reserve(buyer, &Reservation::cash(Decimal::from(500)))
            .unwrap();

        let before = ledger.instrument_total(&inst());
        ledger
            .settle_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(100))
            .unwrap();
        assert_eq!(ledger.instrument_total(&inst()), before);
    }

    #[test]
    fn test_self_settlement_rejected() {
        let ledger = Ledger::new();
        let trader = TraderId::new();
        let err = ledger
            .settle_trade(trader, trader, &inst(), Price::from_u64(5), Quantity::from_u64(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    #[test]
    fn test_reverse_trade_restores_both_legs() {
        let ledger = Ledger::new();
        let seller = TraderId::new();
        let buyer = TraderId::new();

        ledger.credit_tokens(seller, &inst(), Quantity::from_u64(100));
        ledger.credit_cash(buyer, Decimal::from(1000));
        ledger
            .reserve(seller, &Reservation::tokens(inst(), Quantity::from_u64(40)))
            .unwrap();
        ledger
            .reserve(buyer, &Reservation::cash(Decimal::from(200)))
            .unwrap();
        ledger
            .settle_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(40))
            .unwrap();

        ledger
            .reverse_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(40))
            .unwrap();

        let seller_view = ledger.view(seller).unwrap();
        assert_eq!(seller_view.positions[0].owned, Decimal::from(100));
        assert_eq!(seller_view.cash_balance, Decimal::ZERO);

        let buyer_view = ledger.view(buyer).unwrap();
        assert_eq!(buyer_view.cash_balance, Decimal::from(1000));
        assert!(buyer_view.positions.is_empty());
    }

    #[test]
    fn test_reverse_fails_when_buyer_sold_on() {
        let ledger = Ledger::new();
        let seller = TraderId::new();
        let buyer = TraderId::new();

        ledger.credit_tokens(seller, &inst(), Quantity::from_u64(40));
        ledger.credit_cash(buyer, Decimal::from(200));
        ledger
            .reserve(seller, &Reservation::tokens(inst(), Quantity::from_u64(40)))
            .unwrap();
        ledger
            .reserve(buyer, &Reservation::cash(Decimal::from(200)))
            .unwrap();
        ledger
            .settle_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(40))
            .unwrap();

        // Buyer re-lists the tokens; they are reserved now
        ledger
            .reserve(buyer, &Reservation::tokens(inst(), Quantity::from_u64(40)))
            .unwrap();

        let err = ledger
            .reverse_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(40))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    proptest::proptest! {
        // Any interleaving of reserves and releases keeps
        // 0 ≤ reserved ≤ balance, and a rejected reserve mutates nothing.
        #[test]
        fn prop_cash_invariants_hold(amounts in proptest::collection::vec(1u64..5_000, 1..40)) {
            let ledger = Ledger::new();
            let trader = TraderId::new();
            ledger.credit_cash(trader, Decimal::from(10_000u64));

            let mut outstanding: Vec<u64> = Vec::new();
            for (i, amount) in amounts.iter().enumerate() {
                if i % 3 == 2 && !outstanding.is_empty() {
                    let released = outstanding.pop().unwrap();
                    ledger
                        .release(trader, &Reservation::cash(Decimal::from(released)))
                        .unwrap();
                } else {
                    let reserved_total: u64 = outstanding.iter().sum();
                    let reservation = Reservation::cash(Decimal::from(*amount));
                    if reserved_total + amount <= 10_000 {
                        ledger.reserve(trader, &reservation).unwrap();
                        outstanding.push(*amount);
                    } else {
                        proptest::prop_assert!(ledger.reserve(trader, &reservation).is_err());
                    }
                }

                let view = ledger.view(trader).unwrap();
                proptest::prop_assert!(view.reserved_cash >= Decimal::ZERO);
                proptest::prop_assert!(view.reserved_cash <= view.cash_balance);
                let expected: u64 = outstanding.iter().sum();
                proptest::prop_assert_eq!(view.reserved_cash, Decimal::from(expected));
            }
        }

        // Settlement moves tokens and cash one-for-one; supply and total
        // cash are conserved across any run of trades.
        #[test]
        fn prop_settlement_conserves_totals(fills in proptest::collection::vec(1u64..20, 1..20)) {
            let ledger = Ledger::new();
            let seller = TraderId::new();
            let buyer = TraderId::new();
            let total: u64 = fills.iter().sum();

            ledger.credit_tokens(seller, &inst(), Quantity::from_u64(total));
            ledger.credit_cash(buyer, Decimal::from(total * 5));
            ledger
                .reserve(seller, &Reservation::tokens(inst(), Quantity::from_u64(total)))
                .unwrap();
            ledger
                .reserve(buyer, &Reservation::cash(Decimal::from(total * 5)))
                .unwrap();

            for fill in fills {
                ledger
                    .settle_trade(buyer, seller, &inst(), Price::from_u64(5), Quantity::from_u64(fill))
                    .unwrap();

                proptest::prop_assert_eq!(ledger.instrument_total(&inst()), Decimal::from(total));
                let seller_view = ledger.view(seller).unwrap();
                let buyer_view = ledger.view(buyer).unwrap();
                proptest::prop_assert_eq!(
                    seller_view.cash_balance + buyer_view.cash_balance,
                    Decimal::from(total * 5)
                );
            }
        }
    }

    #[test]
    fn test_restore_roundtrip() {
        let ledger = Ledger::new();
        let trader = TraderId::new();
        ledger.credit_cash(trader, Decimal::from(500));
        ledger.credit_tokens(trader, &inst(), Quantity::from_u64(25));
        ledger
            .reserve(trader, &Reservation::cash(Decimal::from(100)))
            .unwrap();

        let views = ledger.all_views();
        let restored = Ledger::new();
        restored.restore(views.clone());
        assert_eq!(restored.all_views(), views);
    }
}
