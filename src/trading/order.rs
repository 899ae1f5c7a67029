use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Plaintext of an order before it is sealed. Only the buy leg carries a
/// PoW solution and the challenge it answers; both fields are omitted
/// entirely on sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub side: Side,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pow: Option<String>,
}

impl OrderPayload {
    pub fn buy(amount: Decimal, challenge: String, pow: String) -> Self {
        Self {
            side: Side::Buy,
            amount,
            challenge: Some(challenge),
            pow: Some(pow),
        }
    }

    pub fn sell(amount: Decimal) -> Self {
        Self {
            side: Side::Sell,
            amount,
            challenge: None,
            pow: None,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
