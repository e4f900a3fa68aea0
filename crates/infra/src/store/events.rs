//! Append-only event log.
//!
//! The sequence number is a `bigserial` assigned by the database, so
//! readers observe events in the commit order of their originating
//! transactions. Records are never updated or deleted.

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};
use uuid::Uuid;

use ledgerd_core::{EventId, LedgerResult, TenantId};
use ledgerd_events::{AggregateType, EventRecord, EventType, NewEvent};

use super::map_sqlx_error;

const EVENT_COLUMNS: &str = "event_id, tenant_id, aggregate_id, aggregate_type, event_type, \
                             event_version, event_data, metadata, sequence_number, created_at";

pub(crate) struct EventRow(pub EventRecord);

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let aggregate_type: String = row.try_get("aggregate_type")?;
        let event_type: String = row.try_get("event_type")?;
        let decode = |e: ledgerd_core::LedgerError| sqlx::Error::Decode(e.to_string().into());

        Ok(EventRow(EventRecord {
            event_id: EventId::from_uuid(row.try_get("event_id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: AggregateType::parse(&aggregate_type).map_err(decode)?,
            event_type: EventType::parse(&event_type).map_err(decode)?,
            event_version: row.try_get("event_version")?,
            event_data: row.try_get("event_data")?,
            metadata: row.try_get("metadata")?,
            sequence_number: row.try_get("sequence_number")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

/// Tenant-scoped view of the event log.
#[derive(Debug, Clone, Copy)]
pub struct EventLog {
    tenant_id: TenantId,
}

impl EventLog {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Append one event. Must be called inside an open transaction so the
    /// record commits (and its sequence number becomes visible) in the same
    /// atomic unit as the state it describes.
    pub async fn append(&self, conn: &mut PgConnection, new: NewEvent) -> LedgerResult<EventRecord> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            INSERT INTO events (event_id, tenant_id, aggregate_id, aggregate_type,
                                event_type, event_version, event_data, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(EventId::new().as_uuid())
        .bind(self.tenant_id.as_uuid())
        .bind(new.aggregate_id)
        .bind(new.aggregate_type.as_str())
        .bind(new.event_type.as_str())
        .bind(new.event_version)
        .bind(&new.event_data)
        .bind(&new.metadata)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("append_event", e))?;

        Ok(row.0)
    }

    /// Events describing one aggregate, ascending event-version order.
    pub async fn by_aggregate(
        &self,
        conn: &mut PgConnection,
        aggregate_id: Uuid,
    ) -> LedgerResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY event_version ASC, sequence_number ASC
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(aggregate_id)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("get_events_by_aggregate", e))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Paged newest-first listing by event type.
    pub async fn by_type(
        &self,
        conn: &mut PgConnection,
        event_type: EventType,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE tenant_id = $1 AND event_type = $2
            ORDER BY sequence_number DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(event_type.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("get_events_by_type", e))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn by_id(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
    ) -> LedgerResult<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE tenant_id = $1 AND event_id = $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_event_by_id", e))?;

        Ok(row.map(|r| r.0))
    }

    /// Global stream read for consumers: every tenant's events after the
    /// given sequence number, ascending.
    pub async fn after_sequence(
        conn: &mut PgConnection,
        after: i64,
        limit: i64,
    ) -> LedgerResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE sequence_number > $1
            ORDER BY sequence_number ASC
            LIMIT $2
            "#
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("get_events_after_sequence", e))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
