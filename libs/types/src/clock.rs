//! Exchange timestamp helpers
//!
//! All timestamps in the system are Unix nanoseconds carried as `i64`.
//! Components receive timestamps from their caller so that replay stays
//! deterministic; only the outermost layer reads the wall clock.

use chrono::Utc;

/// Current wall-clock time as Unix nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds in 24 hours, the statistics window width.
pub const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SEC;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_nanos_is_recent() {
        // Sanity: after 2023-01-01 and before 2100
        let now = now_nanos();
        assert!(now > 1_672_531_200 * NANOS_PER_SEC);
        assert!(now < 4_102_444_800 * NANOS_PER_SEC);
    }
}
