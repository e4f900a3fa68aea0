//! Event log vocabulary: types, records, and wire payloads.

pub mod event;
pub mod payloads;

pub use event::{AggregateType, EventMetadata, EventRecord, EventType, NewEvent};
pub use payloads::{BalanceUpdatedEvent, TransactionLineEvent, TransactionPostedEvent};
