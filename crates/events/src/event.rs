//! Event-log vocabulary and records.
//!
//! Events are immutable once appended; the storage layer assigns the
//! globally-ordered sequence number at commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerd_core::{EventId, LedgerError, LedgerResult, TenantId};

/// Event types the ledger produces (and tenants may subscribe to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "transaction.posted")]
    TransactionPosted,
    #[serde(rename = "balance.updated")]
    BalanceUpdated,
    #[serde(rename = "account.created")]
    AccountCreated,
    #[serde(rename = "account.updated")]
    AccountUpdated,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::TransactionPosted,
        EventType::BalanceUpdated,
        EventType::AccountCreated,
        EventType::AccountUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TransactionPosted => "transaction.posted",
            EventType::BalanceUpdated => "balance.updated",
            EventType::AccountCreated => "account.created",
            EventType::AccountUpdated => "account.updated",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "transaction.posted" => Ok(EventType::TransactionPosted),
            "balance.updated" => Ok(EventType::BalanceUpdated),
            "account.created" => Ok(EventType::AccountCreated),
            "account.updated" => Ok(EventType::AccountUpdated),
            other => Err(LedgerError::validation(format!(
                "unknown event type {other:?}"
            ))),
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of aggregate an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Transaction,
    Account,
    Balance,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Transaction => "transaction",
            AggregateType::Account => "account",
            AggregateType::Balance => "balance",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "transaction" => Ok(AggregateType::Transaction),
            "account" => Ok(AggregateType::Account),
            "balance" => Ok(AggregateType::Balance),
            other => Err(LedgerError::validation(format!(
                "unknown aggregate type {other:?}"
            ))),
        }
    }
}

/// An event not yet appended to the log.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub aggregate_id: Uuid,
    pub aggregate_type: AggregateType,
    pub event_type: EventType,
    pub event_version: i32,
    pub event_data: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// A committed event-log record, sequence number assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub aggregate_id: Uuid,
    pub aggregate_type: AggregateType,
    pub event_type: EventType,
    pub event_version: i32,
    pub event_data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

/// Contextual information recorded alongside every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Producing surface: "api", "worker", "system".
    pub source: String,
}

impl EventMetadata {
    pub fn api() -> Self {
        Self {
            source: "api".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_are_stable() {
        for t in EventType::ALL {
            assert_eq!(EventType::parse(t.as_str()).unwrap(), t);
        }
        assert_eq!(EventType::TransactionPosted.as_str(), "transaction.posted");
        assert!(EventType::parse("webhook.test").is_err());
    }

    #[test]
    fn aggregate_type_round_trips() {
        for s in ["transaction", "account", "balance"] {
            assert_eq!(AggregateType::parse(s).unwrap().as_str(), s);
        }
    }
}
