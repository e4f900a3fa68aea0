//! Wire payloads carried in `event_data`.
//!
//! Field names here are the public contract replayed to webhook
//! subscribers; treat them as frozen.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payload of a `transaction.posted` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPostedEvent {
    pub transaction_id: String,
    pub idempotency_key: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub lines: Vec<TransactionLineEvent>,
    pub posted_at: DateTime<Utc>,
    pub currency: String,
    /// Sum of the debit amounts.
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One line inside a `transaction.posted` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLineEvent {
    pub id: String,
    pub account_id: String,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub side: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Payload of a `balance.updated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdatedEvent {
    pub account_id: String,
    pub account_code: String,
    pub account_name: String,
    pub currency: String,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub balance_change: Decimal,
    /// Transaction that caused the change.
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_updated_serializes_amounts_as_strings() {
        let payload = BalanceUpdatedEvent {
            account_id: "a".into(),
            account_code: "1000".into(),
            account_name: "Cash".into(),
            currency: "NGN".into(),
            previous_balance: dec!(0),
            new_balance: dec!(1000),
            balance_change: dec!(1000),
            updated_by: "t".into(),
            updated_at: Utc::now(),
            version: 1,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["new_balance"], serde_json::json!("1000"));
        assert_eq!(value["previous_balance"], serde_json::json!("0"));
    }

    #[test]
    fn reference_is_omitted_when_absent() {
        let payload = TransactionPostedEvent {
            transaction_id: "t".into(),
            idempotency_key: "k1".into(),
            description: "seed".into(),
            reference: None,
            lines: vec![],
            posted_at: Utc::now(),
            currency: "NGN".into(),
            total_amount: dec!(1000),
            metadata: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("reference").is_none());
        assert!(value.get("metadata").is_none());
    }
}
