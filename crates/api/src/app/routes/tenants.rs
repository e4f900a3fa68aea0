use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use ledgerd_core::LedgerError;
use ledgerd_infra::store::tenants::NewTenant;

use crate::app::{dto, errors};
use crate::context::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/tenants", post(create_tenant))
        .route("/tenants/:slug", get(get_tenant))
}

async fn create_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateTenantBody>,
) -> axum::response::Response {
    if body.slug.is_empty()
        || !body
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "slug must be lowercase alphanumeric with hyphens",
        );
    }

    let new = NewTenant {
        slug: body.slug,
        name: body.name,
        base_currency: body.base_currency.unwrap_or_else(|| "NGN".to_string()),
        metadata: body.metadata.unwrap_or_else(|| serde_json::json!({})),
    };

    let mut conn = match services.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            return errors::ledger_error_to_response(LedgerError::storage(e.to_string()))
        }
    };

    match services.catalog.create(&mut conn, new).await {
        Ok(tenant) => (StatusCode::CREATED, Json(dto::tenant_to_json(&tenant))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn get_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    match services.resolve_tenant(&slug).await {
        Ok(tenant) => (StatusCode::OK, Json(dto::tenant_to_json(&tenant))).into_response(),
        Err(resp) => resp,
    }
}
