//! Boot-time balance seeding
//!
//! The durable ledger of record for cash and tokens lives outside this
//! system. At boot, balances are pulled through [`BalanceSource`] and
//! journaled as deposits/grants so a later replay reproduces them.

use rust_decimal::Decimal;
use types::ids::{InstrumentId, TraderId};
use types::numeric::Quantity;

/// One trader's starting balances from the external ledger of record
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSeed {
    pub trader_id: TraderId,
    pub cash: Decimal,
    pub tokens: Vec<(InstrumentId, Quantity)>,
}

/// External balance source collaborator
pub trait BalanceSource: Send + Sync {
    fn load(&self) -> Vec<BalanceSeed>;
}

/// Fixed in-memory source (demo binary, tests)
#[derive(Debug, Default)]
pub struct StaticBalanceSource {
    seeds: Vec<BalanceSeed>,
}

impl StaticBalanceSource {
    pub fn new(seeds: Vec<BalanceSeed>) -> Self {
        Self { seeds }
    }
}

impl BalanceSource for StaticBalanceSource {
    fn load(&self) -> Vec<BalanceSeed> {
        self.seeds.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_returns_seeds() {
        let seed = BalanceSeed {
            trader_id: TraderId::new(),
            cash: Decimal::from(1000),
            tokens: vec![(InstrumentId::new("PROP-0042"), Quantity::from_u64(50))],
        };
        let source = StaticBalanceSource::new(vec![seed.clone()]);
        assert_eq!(source.load(), vec![seed]);
    }
}
