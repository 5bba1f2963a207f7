//! Per-instrument matching engine
//!
//! Owns one instrument's order book and order store, and runs the
//! continuous double auction against the shared ledger. Every public
//! mutation is invoked from the instrument's single worker task, which
//! is what makes the reserve → match → settle → book-mutation sequence
//! atomic without multi-object locks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use ledger::{Ledger, Reservation};
use types::errors::{CancelError, LedgerError, OrderError};
use types::ids::{OrderId, TraderId};
use types::instrument::Instrument;
use types::numeric::{notional, Quantity};
use types::order::{Order, OrderKind, Side};
use types::trade::Trade;

use crate::book::{DepthSnapshot, OrderBook};
use crate::matching::crossing;
use crate::matching::executor::TradeExecutor;

/// A new order as received from the client layer
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub trader_id: TraderId,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Quantity,
    pub expires_at: Option<i64>,
}

/// Everything produced by one submit command
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The order as accepted, before any matching
    pub accepted: Order,
    /// What acceptance earmarked in the ledger
    pub reserved: Reservation,
    /// Trades produced by the match loop, in sequence order
    pub trades: Vec<Trade>,
    /// Resting makers found expired while matching
    pub expired_makers: Vec<Order>,
    /// The taker order's final state
    pub order: Order,
}

/// Result of a successful cancellation
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// The order's final state (`Cancelled`, or `Expired` when the
    /// cancel touched an order already past its deadline)
    pub order: Order,
    /// The reservation given back, if any remainder was unfilled
    pub released: Option<Reservation>,
}

/// Submission failure: a clean rejection or a fatal ledger fault
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    /// Rejected with no side effects
    #[error(transparent)]
    Rejected(#[from] OrderError),
    /// The ledger detected an invariant violation mid-flight; the
    /// instrument must be halted
    #[error("fatal ledger failure: {0}")]
    Fatal(LedgerError),
}

/// Cancellation failure: a clean rejection or a fatal ledger fault
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CancelFailure {
    #[error(transparent)]
    Rejected(#[from] CancelError),
    #[error("fatal ledger failure: {0}")]
    Fatal(LedgerError),
}

/// The matching engine for one instrument
pub struct InstrumentEngine {
    instrument: Instrument,
    book: OrderBook,
    orders: HashMap<OrderId, Order>,
    executor: TradeExecutor,
    ledger: Arc<Ledger>,
}

impl InstrumentEngine {
    pub fn new(instrument: Instrument, ledger: Arc<Ledger>) -> Self {
        let book = OrderBook::new(instrument.id.clone());
        let executor = TradeExecutor::new(instrument.id.clone(), 1);
        Self {
            instrument,
            book,
            orders: HashMap::new(),
            executor,
            ledger,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn next_sequence(&self) -> u64 {
        self.executor.next_sequence()
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// All of one trader's orders on this instrument, newest first
    pub fn orders_for_trader(&self, trader_id: TraderId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.trader_id == trader_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// All orders held by the engine (checkpointing)
    pub fn all_orders(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    pub fn depth(&self, levels: usize) -> DepthSnapshot {
        self.book.depth(levels)
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Validate, reserve, match, and rest or cancel the remainder
    pub fn submit(&mut self, request: SubmitRequest, now: i64) -> Result<SubmitOutcome, SubmitError> {
        self.validate(&request, now)?;

        let order = Order::new(
            self.instrument.id.clone(),
            request.trader_id,
            request.side,
            request.kind,
            request.quantity,
            now,
            request.expires_at,
        );

        // Reserve the full remaining quantity/notional before touching
        // the book; a failed reservation leaves no trace.
        let reserved = self.reservation_for(&order, now);
        self.ledger
            .reserve(order.trader_id, &reserved)
            .map_err(|e| match e.as_rejection() {
                Some(rejection) => SubmitError::Rejected(rejection),
                None => SubmitError::Fatal(e),
            })?;

        let accepted = order.clone();
        let (order, trades, expired_makers) = self.match_taker(order, now)?;

        debug!(
            order_id = %order.id,
            instrument = %self.instrument.id,
            trades = trades.len(),
            status = ?order.status,
            "order processed"
        );

        self.orders.insert(order.id, order.clone());
        Ok(SubmitOutcome {
            accepted,
            reserved,
            trades,
            expired_makers,
            order,
        })
    }

    fn validate(&self, request: &SubmitRequest, now: i64) -> Result<(), OrderError> {
        if !self.instrument.quantity_aligned(request.quantity) {
            return Err(OrderError::InvalidQuantity(format!(
                "{} is not a positive multiple of lot size {}",
                request.quantity, self.instrument.lot_size
            )));
        }
        if let OrderKind::Limit(price) = request.kind {
            if !self.instrument.price_aligned(price) {
                return Err(OrderError::InvalidPrice(format!(
                    "{} is not a positive multiple of tick size {}",
                    price, self.instrument.tick_size
                )));
            }
        }
        if let Some(deadline) = request.expires_at {
            if deadline <= now {
                return Err(OrderError::InvalidExpiry(format!(
                    "deadline {} is not in the future",
                    deadline
                )));
            }
        }
        Ok(())
    }

    /// What this order must earmark before it may trade or rest
    fn reservation_for(&self, order: &Order, now: i64) -> Reservation {
        match (order.side, order.kind) {
            (Side::Sell, _) => {
                Reservation::tokens(self.instrument.id.clone(), order.remaining_quantity())
            }
            (Side::Buy, OrderKind::Limit(limit)) => {
                Reservation::cash(notional(limit, order.remaining_quantity()))
            }
            (Side::Buy, OrderKind::Market) => {
                // The book cannot change before matching runs in this
                // same turn, so the walked cost is the exact fill cost.
                let (_, cost) =
                    self.book
                        .cost_to_fill_buy(order.remaining_quantity(), order.trader_id, now);
                Reservation::cash(cost)
            }
        }
    }

    /// Price-time-priority match loop
    #[allow(clippy::type_complexity)]
    fn match_taker(
        &mut self,
        mut order: Order,
        now: i64,
    ) -> Result<(Order, Vec<Trade>, Vec<Order>), SubmitError> {
        let mut trades = Vec::new();
        let mut expired_makers = Vec::new();

        while !order.remaining_quantity().is_zero() {
            let Some((maker_price, maker_entry)) =
                self.book.first_eligible_maker(order.side, order.trader_id)
            else {
                break;
            };
            if !crossing::taker_crosses(order.side, &order.kind, maker_price) {
                break;
            }

            // A maker past its deadline is expired in place and matching
            // moves on to the next eligible order.
            if matches!(maker_entry.expires_at, Some(deadline) if deadline <= now) {
                let expired = self
                    .expire_resting(maker_entry.order_id, now)
                    .map_err(SubmitError::Fatal)?;
                expired_makers.push(expired);
                continue;
            }

            let fill = order.remaining_quantity().min(maker_entry.remaining_quantity);

            let (buyer, seller) = match order.side {
                Side::Buy => (order.trader_id, maker_entry.trader_id),
                Side::Sell => (maker_entry.trader_id, order.trader_id),
            };
            self.ledger
                .settle_trade(buyer, seller, &self.instrument.id, maker_price, fill)
                .map_err(SubmitError::Fatal)?;

            // A buy taker reserved at its own limit; executing at the
            // maker's better price frees the difference immediately.
            if order.side == Side::Buy {
                if let OrderKind::Limit(limit) = order.kind {
                    if limit > maker_price {
                        let surplus =
                            (limit.as_decimal() - maker_price.as_decimal()) * fill.as_decimal();
                        self.ledger
                            .release(order.trader_id, &Reservation::cash(surplus))
                            .map_err(SubmitError::Fatal)?;
                    }
                }
            }

            let trade = self.executor.execute(
                maker_entry.order_id,
                order.id,
                maker_entry.trader_id,
                order.trader_id,
                order.side,
                maker_price,
                fill,
                now,
            );
            trades.push(trade);

            order.add_fill(fill, now);

            let maker_order = self
                .orders
                .get_mut(&maker_entry.order_id)
                .ok_or_else(|| {
                    SubmitError::Fatal(LedgerError::InvariantViolation {
                        detail: format!("resting order {} missing from store", maker_entry.order_id),
                    })
                })?;
            maker_order.add_fill(fill, now);

            self.book
                .reduce_resting(&maker_entry.order_id, order.side.opposite(), maker_price, fill);
        }

        if !order.remaining_quantity().is_zero() {
            match order.kind {
                // Market remainder never rests; give back whatever of the
                // reservation the fills did not consume.
                OrderKind::Market => {
                    if order.side == Side::Sell {
                        let release = Reservation::tokens(
                            self.instrument.id.clone(),
                            order.remaining_quantity(),
                        );
                        self.ledger
                            .release(order.trader_id, &release)
                            .map_err(SubmitError::Fatal)?;
                    }
                    // A market buy reserved the exact walked cost, which
                    // the fills consumed in full.
                    order.cancel(now);
                }
                OrderKind::Limit(_) => {
                    self.book.insert_resting(&order);
                }
            }
        }

        Ok((order, trades, expired_makers))
    }

    // ── Cancellation & expiry ───────────────────────────────────────

    /// Cancel an order on behalf of its trader
    pub fn cancel(
        &mut self,
        order_id: OrderId,
        requester: TraderId,
        now: i64,
    ) -> Result<CancelOutcome, CancelFailure> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(CancelError::NotFound { order_id })?;

        if order.trader_id != requester {
            return Err(CancelFailure::Rejected(CancelError::Forbidden { order_id }));
        }
        if order.status.is_terminal() {
            return Err(CancelFailure::Rejected(CancelError::AlreadyTerminal {
                order_id,
                status: order.status,
            }));
        }

        // Touching an order past its deadline expires it instead.
        if order.is_expired_at(now) {
            let expired = self
                .expire_resting(order_id, now)
                .map_err(CancelFailure::Fatal)?;
            let released = Self::remainder_reservation(&self.instrument, &expired);
            return Ok(CancelOutcome {
                order: expired,
                released,
            });
        }

        let order = self.orders.get_mut(&order_id).expect("checked above");
        let released = Self::remainder_reservation(&self.instrument, order);

        if let Some(price) = order.limit_price() {
            self.book.remove_resting(&order_id, order.side, price);
        }
        if let Some(reservation) = &released {
            self.ledger
                .release(order.trader_id, reservation)
                .map_err(CancelFailure::Fatal)?;
        }
        order.cancel(now);

        Ok(CancelOutcome {
            order: order.clone(),
            released,
        })
    }

    /// Expire every resting order whose deadline has passed
    pub fn sweep_expired(&mut self, now: i64) -> Result<Vec<Order>, LedgerError> {
        let due: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.is_expired_at(now))
            .map(|o| o.id)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for order_id in due {
            expired.push(self.expire_resting(order_id, now)?);
        }
        Ok(expired)
    }

    /// Remove a resting order, release its remainder, mark it expired
    fn expire_resting(&mut self, order_id: OrderId, now: i64) -> Result<Order, LedgerError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LedgerError::InvariantViolation {
                detail: format!("resting order {} missing from store", order_id),
            })?;

        if let Some(price) = order.limit_price() {
            self.book.remove_resting(&order_id, order.side, price);
        }
        if let Some(reservation) = Self::remainder_reservation(&self.instrument, order) {
            self.ledger.release(order.trader_id, &reservation)?;
        }
        order.expire(now);
        Ok(order.clone())
    }

    /// The reservation still held for an order's unfilled remainder
    fn remainder_reservation(instrument: &Instrument, order: &Order) -> Option<Reservation> {
        let remaining = order.remaining_quantity();
        if remaining.is_zero() {
            return None;
        }
        match (order.side, order.kind) {
            (Side::Sell, _) => Some(Reservation::tokens(instrument.id.clone(), remaining)),
            (Side::Buy, OrderKind::Limit(limit)) => {
                Some(Reservation::cash(notional(limit, remaining)))
            }
            // A market buy's reservation is consumed exactly by its
            // fills; the unfillable remainder was never reserved.
            (Side::Buy, OrderKind::Market) => None,
        }
    }

    // ── Replay (recovery) ───────────────────────────────────────────

    /// Re-apply an acceptance: restore the reservation and the
    /// pre-match order state
    pub fn apply_accepted(&mut self, order: Order, reserved: &Reservation) -> Result<(), LedgerError> {
        self.ledger.reserve(order.trader_id, reserved)?;
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Re-apply a trade: fills, settlement, surplus release, book update
    pub fn apply_trade(&mut self, trade: &Trade) -> Result<(), LedgerError> {
        self.ledger.settle_trade(
            trade.buyer,
            trade.seller,
            &self.instrument.id,
            trade.price,
            trade.quantity,
        )?;

        let taker = self
            .orders
            .get_mut(&trade.taker_order_id)
            .ok_or_else(|| LedgerError::InvariantViolation {
                detail: format!("taker order {} missing during replay", trade.taker_order_id),
            })?;
        if taker.side == Side::Buy {
            if let OrderKind::Limit(limit) = taker.kind {
                if limit > trade.price {
                    let surplus = (limit.as_decimal() - trade.price.as_decimal())
                        * trade.quantity.as_decimal();
                    self.ledger
                        .release(taker.trader_id, &Reservation::cash(surplus))?;
                }
            }
        }
        taker.add_fill(trade.quantity, trade.executed_at);

        let maker = self
            .orders
            .get_mut(&trade.maker_order_id)
            .ok_or_else(|| LedgerError::InvariantViolation {
                detail: format!("maker order {} missing during replay", trade.maker_order_id),
            })?;
        maker.add_fill(trade.quantity, trade.executed_at);
        let maker_side = maker.side;
        let maker_price = maker.limit_price().ok_or_else(|| LedgerError::InvariantViolation {
            detail: "resting maker without a limit price".into(),
        })?;
        self.book
            .reduce_resting(&trade.maker_order_id, maker_side, maker_price, trade.quantity);

        if trade.sequence >= self.executor.next_sequence() {
            self.executor.set_next_sequence(trade.sequence + 1);
        }
        Ok(())
    }

    /// Re-apply the resting of a limit remainder
    pub fn apply_rested(&mut self, order_id: &OrderId) -> Result<(), LedgerError> {
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| LedgerError::InvariantViolation {
                detail: format!("rested order {} missing during replay", order_id),
            })?;
        self.book.insert_resting(order);
        Ok(())
    }

    /// Re-apply a cancellation (user cancel or market remainder)
    pub fn apply_cancelled(&mut self, order_id: &OrderId, timestamp: i64) -> Result<(), LedgerError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LedgerError::InvariantViolation {
                detail: format!("cancelled order {} missing during replay", order_id),
            })?;
        let released = Self::remainder_reservation(&self.instrument, order);
        if let Some(price) = order.limit_price() {
            self.book.remove_resting(order_id, order.side, price);
        }
        let trader = order.trader_id;
        order.cancel(timestamp);
        if let Some(reservation) = released {
            self.ledger.release(trader, &reservation)?;
        }
        Ok(())
    }

    /// Re-apply an expiry
    pub fn apply_expired(&mut self, order_id: &OrderId, timestamp: i64) -> Result<(), LedgerError> {
        self.expire_resting(*order_id, timestamp).map(|_| ())
    }

    /// Rebuild the engine from checkpointed orders
    ///
    /// The ledger is restored separately; resting remainders are
    /// re-inserted into a fresh book.
    pub fn restore(
        instrument: Instrument,
        orders: Vec<Order>,
        next_sequence: u64,
        ledger: Arc<Ledger>,
    ) -> Self {
        let mut engine = Self::new(instrument, ledger);
        engine.executor.set_next_sequence(next_sequence);
        for order in orders {
            if !order.status.is_terminal()
                && !order.remaining_quantity().is_zero()
                && order.limit_price().is_some()
            {
                engine.book.insert_resting(&order);
            }
            engine.orders.insert(order.id, order);
        }
        engine
    }
}
