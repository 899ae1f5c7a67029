use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::Transaction;

/// Flags transactions whose amounts both reach the configured minimum.
#[derive(Debug, Clone)]
pub struct OpportunityDetector {
    min_amount: Decimal,
}

impl OpportunityDetector {
    pub fn new(min_amount: Decimal) -> Self {
        Self { min_amount }
    }

    pub fn min_amount(&self) -> Decimal {
        self.min_amount
    }

    #[instrument(name = "check.arbitrage_opportunity", skip_all)]
    pub fn is_opportunity(&self, tx: &Transaction) -> bool {
        let eligible = is_opportunity(tx, self.min_amount);
        debug!(amount_x = %tx.amount_x, amount_y = %tx.amount_y, eligible, "Checked opportunity");
        eligible
    }
}

/// Inclusive threshold on both legs of the transaction.
pub fn is_opportunity(tx: &Transaction, min_amount: Decimal) -> bool {
    tx.amount_x >= min_amount && tx.amount_y >= min_amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(x: Decimal, y: Decimal) -> Transaction {
        Transaction::new("address1", "address2", x, y)
    }

    #[test]
    fn both_amounts_above_threshold() {
        assert!(is_opportunity(&tx(dec!(10.5), dec!(20.3)), dec!(10)));
    }

    #[test]
    fn one_amount_below_threshold() {
        assert!(!is_opportunity(&tx(dec!(5), dec!(20)), dec!(10)));
        assert!(!is_opportunity(&tx(dec!(20), dec!(9.99)), dec!(10)));
    }

    #[test]
    fn threshold_is_inclusive() {
        let detector = OpportunityDetector::new(dec!(10));
        assert!(detector.is_opportunity(&tx(dec!(10), dec!(15))));
        assert!(detector.is_opportunity(&tx(dec!(15), dec!(10.00))));
        assert!(detector.is_opportunity(&tx(dec!(10), dec!(10))));
    }
}
