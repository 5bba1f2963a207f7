//! OHLC candle series
//!
//! Groups trades into fixed-width time buckets aligned to epoch
//! boundaries. Buckets with no trades are omitted; gap-filling with flat
//! candles (previous close, zero volume) is available on request.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

/// Supported candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
}

impl Interval {
    /// Duration of this interval in nanoseconds
    pub fn duration_nanos(&self) -> i64 {
        match self {
            Interval::M1 => 60 * 1_000_000_000,
            Interval::M5 => 5 * 60 * 1_000_000_000,
            Interval::M15 => 15 * 60 * 1_000_000_000,
            Interval::H1 => 3600 * 1_000_000_000,
            Interval::H4 => 4 * 3600 * 1_000_000_000,
            Interval::D1 => 86_400 * 1_000_000_000_i64,
        }
    }

    /// Align a timestamp to this interval's boundary (floor)
    pub fn align(&self, timestamp_nanos: i64) -> i64 {
        let duration = self.duration_nanos();
        (timestamp_nanos / duration) * duration
    }

    /// All supported intervals
    pub fn all() -> &'static [Interval] {
        &[
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::H1,
            Interval::H4,
            Interval::D1,
        ]
    }

    /// Parse the wire name ("1m", "5m", "15m", "1h", "4h", "1d")
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Interval::M1),
            "5m" => Some(Interval::M5),
            "15m" => Some(Interval::M15),
            "1h" => Some(Interval::H1),
            "4h" => Some(Interval::H4),
            "1d" => Some(Interval::D1),
            _ => None,
        }
    }
}

/// A single OHLC candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
    pub open_time: i64,
    pub close_time: i64,
}

impl Candle {
    fn new(price: Decimal, volume: Decimal, open_time: i64, interval: Interval) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            trade_count: 1,
            open_time,
            close_time: open_time + interval.duration_nanos() - 1,
        }
    }

    fn update(&mut self, price: Decimal, volume: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += volume;
        self.trade_count += 1;
    }

    /// A flat candle carrying the previous close across an empty bucket
    fn flat(prev_close: Decimal, open_time: i64, interval: Interval) -> Self {
        Self {
            open: prev_close,
            high: prev_close,
            low: prev_close,
            close: prev_close,
            volume: Decimal::ZERO,
            trade_count: 0,
            open_time,
            close_time: open_time + interval.duration_nanos() - 1,
        }
    }

    /// Validate OHLC invariants
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
            && self.close_time > self.open_time
    }
}

/// Candle series for one instrument at one interval
#[derive(Debug, Clone)]
pub struct CandleSeries {
    interval: Interval,
    /// Buckets by open time; only buckets that saw trades exist
    buckets: BTreeMap<i64, Candle>,
    max_history: usize,
}

impl CandleSeries {
    pub fn new(interval: Interval, max_history: usize) -> Self {
        Self {
            interval,
            buckets: BTreeMap::new(),
            max_history,
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Fold a trade into its bucket
    pub fn record(&mut self, price: Price, quantity: Quantity, executed_at: i64) {
        let open_time = self.interval.align(executed_at);
        let price_dec = price.as_decimal();
        let volume = quantity.as_decimal();

        self.buckets
            .entry(open_time)
            .and_modify(|candle| candle.update(price_dec, volume))
            .or_insert_with(|| Candle::new(price_dec, volume, open_time, self.interval));

        while self.buckets.len() > self.max_history {
            self.buckets.pop_first();
        }
    }

    /// The series in chronological order, empty buckets omitted
    pub fn candles(&self, limit: usize) -> Vec<Candle> {
        let skip = self.buckets.len().saturating_sub(limit);
        self.buckets.values().skip(skip).cloned().collect()
    }

    /// The series with empty buckets between trades filled by flat
    /// candles carrying the previous close
    pub fn candles_gap_filled(&self, limit: usize) -> Vec<Candle> {
        let duration = self.interval.duration_nanos();
        let mut filled = Vec::new();
        let mut prev: Option<&Candle> = None;

        for candle in self.buckets.values() {
            if let Some(prev) = prev {
                let mut t = prev.open_time + duration;
                while t < candle.open_time {
                    filled.push(Candle::flat(prev.close, t, self.interval));
                    t += duration;
                }
            }
            filled.push(candle.clone());
            prev = Some(candle);
        }

        let skip = filled.len().saturating_sub(limit);
        filled.split_off(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: i64) -> i64 {
        m * 60 * 1_000_000_000
    }

    fn series() -> CandleSeries {
        CandleSeries::new(Interval::M1, 1000)
    }

    #[test]
    fn test_interval_alignment() {
        let ts = minutes(5) + 30_000_000_000; // 5m30s
        assert_eq!(Interval::M1.align(ts), minutes(5));
        assert_eq!(Interval::M5.align(ts), minutes(5));
        assert_eq!(Interval::M15.align(ts), minutes(0));
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("1m"), Some(Interval::M1));
        assert_eq!(Interval::parse("1d"), Some(Interval::D1));
        assert_eq!(Interval::parse("7x"), None);
    }

    #[test]
    fn test_single_bucket_ohlc() {
        let mut s = series();
        s.record(Price::from_u64(50), Quantity::from_u64(1), minutes(0) + 1);
        s.record(Price::from_u64(53), Quantity::from_u64(2), minutes(0) + 2);
        s.record(Price::from_u64(49), Quantity::from_u64(3), minutes(0) + 3);
        s.record(Price::from_u64(51), Quantity::from_u64(1), minutes(0) + 4);

        let candles = s.candles(10);
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open, Decimal::from(50));
        assert_eq!(c.high, Decimal::from(53));
        assert_eq!(c.low, Decimal::from(49));
        assert_eq!(c.close, Decimal::from(51));
        assert_eq!(c.volume, Decimal::from(7));
        assert_eq!(c.trade_count, 4);
        assert!(c.is_valid());
    }

    #[test]
    fn test_empty_buckets_omitted() {
        let mut s = series();
        s.record(Price::from_u64(50), Quantity::from_u64(1), minutes(0));
        s.record(Price::from_u64(52), Quantity::from_u64(1), minutes(5));

        // Minutes 1-4 saw no trades and do not appear
        let candles = s.candles(10);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, minutes(0));
        assert_eq!(candles[1].open_time, minutes(5));
    }

    #[test]
    fn test_gap_filling_on_request() {
        let mut s = series();
        s.record(Price::from_u64(50), Quantity::from_u64(1), minutes(0));
        s.record(Price::from_u64(52), Quantity::from_u64(1), minutes(3));

        let candles = s.candles_gap_filled(10);
        assert_eq!(candles.len(), 4);
        // Flat candles carry the previous close with zero volume
        for flat in &candles[1..3] {
            assert_eq!(flat.open, Decimal::from(50));
            assert_eq!(flat.close, Decimal::from(50));
            assert_eq!(flat.volume, Decimal::ZERO);
            assert_eq!(flat.trade_count, 0);
            assert!(flat.is_valid());
        }
    }

    #[test]
    fn test_history_trimmed() {
        let mut s = CandleSeries::new(Interval::M1, 3);
        for m in 0..6 {
            s.record(Price::from_u64(50), Quantity::from_u64(1), minutes(m));
        }
        assert_eq!(s.candles(100).len(), 3);
    }

    #[test]
    fn test_limit_returns_most_recent() {
        let mut s = series();
        for m in 0..5 {
            s.record(Price::from_u64(50 + m as u64), Quantity::from_u64(1), minutes(m));
        }
        let candles = s.candles(2);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, minutes(3));
        assert_eq!(candles[1].open_time, minutes(4));
    }
}
