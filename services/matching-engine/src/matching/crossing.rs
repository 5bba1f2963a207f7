//! Crossing detection logic
//!
//! Determines when an incoming order can trade against a resting price.
//! Market orders cross any opposing price; limit orders cross when the
//! maker's price satisfies their limit.

use types::numeric::Price;
use types::order::{OrderKind, Side};

/// Check whether a taker can trade at the given maker price
pub fn taker_crosses(taker_side: Side, taker_kind: &OrderKind, maker_price: Price) -> bool {
    match taker_kind {
        OrderKind::Market => true,
        OrderKind::Limit(limit) => match taker_side {
            Side::Buy => *limit >= maker_price,
            Side::Sell => *limit <= maker_price,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_buy_crossing() {
        let kind = OrderKind::Limit(Price::from_u64(50));
        assert!(taker_crosses(Side::Buy, &kind, Price::from_u64(49)));
        assert!(taker_crosses(Side::Buy, &kind, Price::from_u64(50)));
        assert!(!taker_crosses(Side::Buy, &kind, Price::from_u64(51)));
    }

    #[test]
    fn test_limit_sell_crossing() {
        let kind = OrderKind::Limit(Price::from_u64(50));
        assert!(taker_crosses(Side::Sell, &kind, Price::from_u64(51)));
        assert!(taker_crosses(Side::Sell, &kind, Price::from_u64(50)));
        assert!(!taker_crosses(Side::Sell, &kind, Price::from_u64(49)));
    }

    #[test]
    fn test_market_always_crosses() {
        assert!(taker_crosses(Side::Buy, &OrderKind::Market, Price::from_u64(1)));
        assert!(taker_crosses(
            Side::Sell,
            &OrderKind::Market,
            Price::from_u64(1_000_000)
        ));
    }
}
