//! Webhook delivery pipeline: subscription config, signing, dispatch,
//! the poll worker, and the operator surface.

pub mod config;
pub mod dispatcher;
pub mod signature;
pub mod worker;

use sqlx::{PgConnection, PgPool};
use tracing::debug;

use ledgerd_core::{DeliveryId, LedgerError, LedgerResult};
use ledgerd_events::EventRecord;

use crate::store::{DeliveryStore, Tenant, TenantCatalog, WebhookDelivery};

pub use config::{WebhookConfig, WebhookConfigRequest};
pub use dispatcher::{DispatchOutcome, Dispatcher, WebhookPayload, TEST_EVENT_TYPE};
pub use worker::{DeliveryWorker, WorkerHandle};

/// Queue a delivery row for every appended event the tenant subscribes to.
/// Called from inside the posting unit so the rows commit with the events.
pub async fn enqueue_for_events(
    conn: &mut PgConnection,
    tenant: &Tenant,
    events: &[EventRecord],
    max_attempts: i32,
) -> LedgerResult<()> {
    let Some(config) = WebhookConfig::from_metadata(&tenant.metadata) else {
        return Ok(());
    };
    if !config.enabled {
        return Ok(());
    }

    let store = DeliveryStore::new(tenant.id);
    for event in events {
        if config.subscribes_to(event.event_type.as_str()) {
            let delivery = store
                .enqueue(conn, event.event_id, &config.url, max_attempts)
                .await?;
            debug!(
                delivery_id = %delivery.id,
                event_id = %event.event_id,
                url = %config.url,
                "queued webhook delivery"
            );
        }
    }
    Ok(())
}

/// Operator-facing webhook surface: configuration, delivery history,
/// manual retry, and synchronous test dispatch.
#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    dispatcher: Dispatcher,
}

impl WebhookService {
    pub fn new(pool: PgPool, dispatcher: Dispatcher) -> Self {
        Self { pool, dispatcher }
    }

    /// Merge the subscription settings into the tenant's metadata.
    pub async fn configure(
        &self,
        tenant: &Tenant,
        request: WebhookConfigRequest,
    ) -> LedgerResult<Tenant> {
        request.validate()?;
        let merged = request.merge_into(&tenant.metadata);
        let mut conn = self.acquire().await?;
        TenantCatalog
            .update_metadata(&mut conn, tenant.id, &merged)
            .await
    }

    pub async fn list_deliveries(
        &self,
        tenant: &Tenant,
        limit: i64,
    ) -> LedgerResult<Vec<WebhookDelivery>> {
        let mut conn = self.acquire().await?;
        DeliveryStore::new(tenant.id).list(&mut conn, limit).await
    }

    pub async fn get_delivery(
        &self,
        tenant: &Tenant,
        id: DeliveryId,
    ) -> LedgerResult<WebhookDelivery> {
        let mut conn = self.acquire().await?;
        DeliveryStore::new(tenant.id).get(&mut conn, id).await
    }

    /// Reset a delivery for immediate retry. Refused when it already
    /// succeeded or its attempts are exhausted.
    pub async fn retry_delivery(&self, tenant: &Tenant, id: DeliveryId) -> LedgerResult<()> {
        let mut conn = self.acquire().await?;
        let store = DeliveryStore::new(tenant.id);
        let delivery = store.get(&mut conn, id).await?;

        if delivery.delivered_at.is_some() {
            return Err(LedgerError::WebhookAlreadyDelivered);
        }
        if delivery.attempts >= delivery.max_attempts {
            return Err(LedgerError::WebhookRetriesExhausted);
        }

        store.reset_for_retry(&mut conn, id).await
    }

    /// Send a synthetic `webhook.test` event without writing a delivery
    /// row; the outcome is returned to the caller directly.
    pub async fn send_test(&self, tenant: &Tenant) -> LedgerResult<DispatchOutcome> {
        let config = WebhookConfig::from_metadata(&tenant.metadata)
            .ok_or(LedgerError::WebhookNotConfigured)?;

        let payload = WebhookPayload {
            id: format!("evt_test_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            event_type: TEST_EVENT_TYPE.to_string(),
            created: tenant.created_at.timestamp(),
            data: serde_json::json!({"message": "This is a test webhook from LedgerService"}),
            tenant_id: tenant.id.to_string(),
            livemode: false,
        };

        Ok(self.dispatcher.dispatch(&config, &payload).await)
    }

    async fn acquire(&self) -> LedgerResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| LedgerError::storage(format!("acquire failed: {e}")))
    }
}
