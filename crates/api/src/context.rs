//! Shared application state and tenant resolution.

use axum::http::StatusCode;
use axum::response::Response;
use sqlx::PgPool;

use ledgerd_core::{LedgerError, LedgerResult};
use ledgerd_infra::store::{Tenant, TenantCatalog};
use ledgerd_infra::{ChartService, Config, Dispatcher, PostingEngine, WebhookService};

use crate::app::errors;

/// Everything the route handlers need, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub pool: PgPool,
    pub catalog: TenantCatalog,
    pub engine: PostingEngine,
    pub chart: ChartService,
    pub webhooks: WebhookService,
}

impl AppServices {
    pub fn build(pool: PgPool, cfg: &Config) -> LedgerResult<Self> {
        let dispatcher = Dispatcher::new(cfg.webhook_timeout)?;
        Ok(Self {
            engine: PostingEngine::new(pool.clone(), cfg.webhook_max_retries),
            chart: ChartService::new(pool.clone(), cfg.webhook_max_retries),
            webhooks: WebhookService::new(pool.clone(), dispatcher),
            catalog: TenantCatalog,
            pool,
        })
    }

    /// Resolve a tenant slug to its record, or a ready-made 404 response.
    pub async fn resolve_tenant(&self, slug: &str) -> Result<Tenant, Response> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| errors::ledger_error_to_response(LedgerError::storage(e.to_string())))?;

        match self.catalog.get_by_slug(&mut conn, slug).await {
            Ok(Some(tenant)) => Ok(tenant),
            Ok(None) => Err(errors::json_error(
                StatusCode::NOT_FOUND,
                "tenant_not_found",
                format!("unknown tenant {slug:?}"),
            )),
            Err(e) => Err(errors::ledger_error_to_response(e)),
        }
    }
}
