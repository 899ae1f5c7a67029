use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A pending transaction as received from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(alias = "from")]
    pub source_address: String,
    #[serde(alias = "to")]
    pub dest_address: String,
    pub amount_x: Decimal,
    pub amount_y: Decimal,
}

impl Transaction {
    pub fn new(
        source_address: impl Into<String>,
        dest_address: impl Into<String>,
        amount_x: Decimal,
        amount_y: Decimal,
    ) -> Self {
        Self {
            source_address: source_address.into(),
            dest_address: dest_address.into(),
            amount_x,
            amount_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_feed_json_with_numeric_or_string_amounts() {
        let tx: Transaction = serde_json::from_str(
            r#"{"from":"address1","to":"address2","amount_x":10.5,"amount_y":"20.3"}"#,
        )
        .unwrap();

        assert_eq!(tx, Transaction::new("address1", "address2", dec!(10.5), dec!(20.3)));
    }

    #[test]
    fn rejects_missing_amounts() {
        let res = serde_json::from_str::<Transaction>(r#"{"from":"a","to":"b","amount_x":1}"#);
        assert!(res.is_err());
    }
}
