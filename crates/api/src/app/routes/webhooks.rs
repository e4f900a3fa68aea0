use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use ledgerd_core::DeliveryId;
use ledgerd_infra::webhook::WebhookConfigRequest;

use crate::app::{dto, errors};
use crate::context::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/webhooks/config", put(configure))
        .route("/webhooks/deliveries", get(list_deliveries))
        .route("/webhooks/deliveries/:id", get(get_delivery))
        .route("/webhooks/deliveries/:id/retry", post(retry_delivery))
        .route("/webhooks/test", post(send_test))
}

async fn configure(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Json(body): Json<WebhookConfigRequest>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.webhooks.configure(&tenant, body).await {
        Ok(updated) => {
            // Echo the active configuration, never the secret.
            let config = ledgerd_infra::webhook::WebhookConfig::from_metadata(&updated.metadata);
            let (url, events, enabled) = match &config {
                Some(c) => (c.url.clone(), c.events.clone(), c.enabled),
                None => (String::new(), Vec::new(), false),
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "url": url,
                    "events": events,
                    "enabled": enabled,
                    "updated_at": updated.updated_at,
                })),
            )
                .into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_deliveries(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services
        .webhooks
        .list_deliveries(&tenant, query.limit.clamp(1, 500))
        .await
    {
        Ok(deliveries) => {
            let items: Vec<_> = deliveries.iter().map(dto::delivery_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "deliveries": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn get_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, DeliveryId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.webhooks.get_delivery(&tenant, id).await {
        Ok(delivery) => (StatusCode::OK, Json(dto::delivery_to_json(&delivery))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn retry_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, DeliveryId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.webhooks.retry_delivery(&tenant, id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "queued" })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn send_test(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.webhooks.send_test(&tenant).await {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
