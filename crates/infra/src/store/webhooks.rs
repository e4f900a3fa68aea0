//! Durable webhook-delivery rows.
//!
//! A row is terminal once `delivered_at` or `failed_at` is set; until then
//! `next_retry_at` says when the worker may try again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};

use ledgerd_core::{DeliveryId, EventId, LedgerError, LedgerResult, TenantId};

use super::map_sqlx_error;

const DELIVERY_COLUMNS: &str = "id, tenant_id, event_id, url, max_attempts, attempts, \
                                http_status_code, response_body, next_retry_at, \
                                delivered_at, failed_at, created_at";

#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub tenant_id: TenantId,
    pub event_id: EventId,
    pub url: String,
    pub max_attempts: i32,
    pub attempts: i32,
    pub http_status_code: Option<i32>,
    pub response_body: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookDelivery {
    pub fn is_terminal(&self) -> bool {
        self.delivered_at.is_some() || self.failed_at.is_some()
    }
}

impl<'r> FromRow<'r, PgRow> for WebhookDelivery {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(WebhookDelivery {
            id: DeliveryId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            event_id: EventId::from_uuid(row.try_get("event_id")?),
            url: row.try_get("url")?,
            max_attempts: row.try_get("max_attempts")?,
            attempts: row.try_get("attempts")?,
            http_status_code: row.try_get("http_status_code")?,
            response_body: row.try_get("response_body")?,
            next_retry_at: row.try_get("next_retry_at")?,
            delivered_at: row.try_get("delivered_at")?,
            failed_at: row.try_get("failed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Tenant-scoped delivery store. Worker-facing reads that span tenants are
/// associated functions.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryStore {
    tenant_id: TenantId,
}

impl DeliveryStore {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Queue a delivery for an event: attempts=0, due immediately.
    pub async fn enqueue(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
        url: &str,
        max_attempts: i32,
    ) -> LedgerResult<WebhookDelivery> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            r#"
            INSERT INTO webhook_deliveries (id, tenant_id, event_id, url, max_attempts,
                                            attempts, next_retry_at)
            VALUES ($1, $2, $3, $4, $5, 0, now())
            RETURNING {DELIVERY_COLUMNS}
            "#
        ))
        .bind(DeliveryId::new().as_uuid())
        .bind(self.tenant_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(url)
        .bind(max_attempts)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("create_webhook_delivery", e))
    }

    /// Due rows across all tenants, oldest first. Worker-only.
    pub async fn due(
        conn: &mut PgConnection,
        batch_size: i64,
    ) -> LedgerResult<Vec<WebhookDelivery>> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            r#"
            SELECT {DELIVERY_COLUMNS}
            FROM webhook_deliveries
            WHERE next_retry_at IS NOT NULL
                AND next_retry_at <= now()
                AND attempts < max_attempts
                AND delivered_at IS NULL
                AND failed_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(batch_size)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("get_pending_webhook_deliveries", e))
    }

    /// Record a 2xx outcome: terminal success.
    pub async fn mark_success(
        conn: &mut PgConnection,
        id: DeliveryId,
        http_status_code: i32,
        response_body: &str,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET attempts = attempts + 1,
                http_status_code = $2,
                response_body = $3,
                delivered_at = now(),
                next_retry_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(http_status_code)
        .bind(response_body)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("update_webhook_delivery_success", e))?;

        Ok(())
    }

    /// Record a failed attempt. `next_retry_at = None` makes the row
    /// terminal (`failed_at` is stamped).
    pub async fn mark_failure(
        conn: &mut PgConnection,
        id: DeliveryId,
        http_status_code: i32,
        response_body: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET attempts = attempts + 1,
                http_status_code = $2,
                response_body = $3,
                next_retry_at = $4,
                failed_at = CASE WHEN $4::timestamptz IS NULL THEN now() ELSE NULL END
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(http_status_code)
        .bind(response_body)
        .bind(next_retry_at)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("update_webhook_delivery_failure", e))?;

        Ok(())
    }

    /// Reset a not-yet-successful delivery for an immediate operator retry.
    pub async fn reset_for_retry(&self, conn: &mut PgConnection, id: DeliveryId) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET next_retry_at = now(), failed_at = NULL
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("reset_webhook_delivery", e))?;

        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut PgConnection,
        id: DeliveryId,
    ) -> LedgerResult<WebhookDelivery> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            r#"
            SELECT {DELIVERY_COLUMNS}
            FROM webhook_deliveries
            WHERE tenant_id = $1 AND id = $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_webhook_delivery", e))?
        .ok_or_else(|| LedgerError::validation("webhook delivery not found"))
    }

    /// Delivery history for the tenant, newest first.
    pub async fn list(
        &self,
        conn: &mut PgConnection,
        limit: i64,
    ) -> LedgerResult<Vec<WebhookDelivery>> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            r#"
            SELECT {DELIVERY_COLUMNS}
            FROM webhook_deliveries
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("list_webhook_deliveries", e))
    }
}
