//! Rolling 24 h market statistics
//!
//! Maintains a sliding window of trade ticks. Eviction records the most
//! recent price to age out of the window, which is exactly the
//! "price 24 h ago" needed for the percent-change figure; before
//! anything has aged out, the window's first trade stands in for it.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::clock::NANOS_PER_DAY;
use types::numeric::{Price, Quantity};

/// One trade as seen by the statistics window
#[derive(Debug, Clone, Copy, PartialEq)]
struct TradeTick {
    price: Price,
    quantity: Quantity,
    executed_at: i64,
}

/// Point-in-time statistics over the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub volume_24h: Decimal,
    pub trades_24h: u64,
    pub high_24h: Option<Price>,
    pub low_24h: Option<Price>,
    pub last_price: Option<Price>,
    /// Percent change vs. the price 24 h ago; None without a reference
    pub change_24h: Option<Decimal>,
}

/// Incrementally maintained trailing-window statistics
#[derive(Debug, Clone)]
pub struct RollingStats {
    window_nanos: i64,
    window: VecDeque<TradeTick>,
    volume: Decimal,
    /// Most recent price evicted from the window
    price_before_window: Option<Price>,
}

impl Default for RollingStats {
    fn default() -> Self {
        Self::new(NANOS_PER_DAY)
    }
}

impl RollingStats {
    pub fn new(window_nanos: i64) -> Self {
        Self {
            window_nanos,
            window: VecDeque::new(),
            volume: Decimal::ZERO,
            price_before_window: None,
        }
    }

    /// Record a trade and age out everything older than the window
    pub fn record(&mut self, price: Price, quantity: Quantity, executed_at: i64) {
        self.window.push_back(TradeTick {
            price,
            quantity,
            executed_at,
        });
        self.volume += quantity.as_decimal();
        self.evict(executed_at);
    }

    /// Age out trades older than the window relative to `now`
    pub fn evict(&mut self, now: i64) {
        let cutoff = now - self.window_nanos;
        while let Some(front) = self.window.front() {
            if front.executed_at > cutoff {
                break;
            }
            self.price_before_window = Some(front.price);
            self.volume -= front.quantity.as_decimal();
            self.window.pop_front();
        }
    }

    /// Compute the current snapshot, aging the window to `now` first
    pub fn snapshot(&mut self, now: i64) -> StatsSnapshot {
        self.evict(now);

        let high = self.window.iter().map(|t| t.price).max();
        let low = self.window.iter().map(|t| t.price).min();
        let last = self.window.back().map(|t| t.price);

        let reference = self
            .price_before_window
            .or_else(|| self.window.front().map(|t| t.price));
        let change = match (last, reference) {
            (Some(last), Some(reference)) => {
                let base = reference.as_decimal();
                Some((last.as_decimal() - base) / base * Decimal::from(100))
            }
            _ => None,
        };

        StatsSnapshot {
            volume_24h: self.volume,
            trades_24h: self.window.len() as u64,
            high_24h: high,
            low_24h: low,
            last_price: last,
            change_24h: change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::clock::NANOS_PER_SEC;

    fn at(seconds: i64) -> i64 {
        seconds * NANOS_PER_SEC
    }

    fn price(p: u64) -> Price {
        Price::from_u64(p)
    }

    fn qty(q: u64) -> Quantity {
        Quantity::from_u64(q)
    }

    #[test]
    fn test_empty_snapshot() {
        let mut stats = RollingStats::default();
        let snap = stats.snapshot(at(0));
        assert_eq!(snap.volume_24h, Decimal::ZERO);
        assert_eq!(snap.trades_24h, 0);
        assert_eq!(snap.last_price, None);
        assert_eq!(snap.change_24h, None);
    }

    #[test]
    fn test_volume_and_extrema() {
        let mut stats = RollingStats::default();
        stats.record(price(5), qty(40), at(10));
        stats.record(price(7), qty(10), at(20));
        stats.record(price(4), qty(5), at(30));

        let snap = stats.snapshot(at(60));
        assert_eq!(snap.volume_24h, Decimal::from(55));
        assert_eq!(snap.trades_24h, 3);
        assert_eq!(snap.high_24h, Some(price(7)));
        assert_eq!(snap.low_24h, Some(price(4)));
        assert_eq!(snap.last_price, Some(price(4)));
    }

    #[test]
    fn test_window_eviction() {
        let mut stats = RollingStats::new(at(100));
        stats.record(price(5), qty(10), at(0));
        stats.record(price(6), qty(10), at(50));

        // First trade ages out at t=100
        let snap = stats.snapshot(at(101));
        assert_eq!(snap.trades_24h, 1);
        assert_eq!(snap.volume_24h, Decimal::from(10));
        assert_eq!(snap.low_24h, Some(price(6)));
    }

    #[test]
    fn test_change_uses_evicted_price() {
        let mut stats = RollingStats::new(at(100));
        stats.record(price(4), qty(1), at(0));
        stats.record(price(5), qty(1), at(150));

        // The 4-price trade aged out; it is the reference price
        let snap = stats.snapshot(at(160));
        assert_eq!(snap.trades_24h, 1);
        assert_eq!(snap.change_24h, Some(Decimal::from(25)));
    }

    #[test]
    fn test_change_falls_back_to_window_start() {
        let mut stats = RollingStats::default();
        stats.record(price(4), qty(1), at(0));
        stats.record(price(6), qty(1), at(10));

        let snap = stats.snapshot(at(20));
        assert_eq!(snap.change_24h, Some(Decimal::from(50)));
    }

    #[test]
    fn test_snapshot_after_everything_ages_out() {
        let mut stats = RollingStats::new(at(100));
        stats.record(price(5), qty(10), at(0));

        let snap = stats.snapshot(at(1000));
        assert_eq!(snap.trades_24h, 0);
        assert_eq!(snap.volume_24h, Decimal::ZERO);
        assert_eq!(snap.last_price, None);
        // No last price means no change figure, despite a reference
        assert_eq!(snap.change_24h, None);
    }
}
