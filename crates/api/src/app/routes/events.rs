use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use ledgerd_core::LedgerError;
use ledgerd_events::EventType;
use ledgerd_infra::store::EventLog;

use crate::app::{dto, errors};
use crate::context::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/events", get(list_events_by_type))
        .route("/events/aggregate/:aggregate_id", get(events_by_aggregate))
}

/// Global stream endpoint, mounted outside the tenant scope.
pub fn stream_router() -> Router {
    Router::new().route("/events/stream", get(event_stream))
}

#[derive(Debug, Deserialize)]
struct TypeQuery {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_events_by_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Query(query): Query<TypeQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let event_type = match EventType::parse(&query.event_type) {
        Ok(t) => t,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let mut conn = match services.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            return errors::ledger_error_to_response(LedgerError::storage(e.to_string()))
        }
    };

    let result = EventLog::new(tenant.id)
        .by_type(
            &mut conn,
            event_type,
            query.limit.clamp(1, 500),
            query.offset.max(0),
        )
        .await;

    match result {
        Ok(events) => {
            let items: Vec<_> = events.iter().map(dto::event_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "events": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn events_by_aggregate(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, aggregate_id)): Path<(String, Uuid)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let mut conn = match services.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            return errors::ledger_error_to_response(LedgerError::storage(e.to_string()))
        }
    };

    match EventLog::new(tenant.id).by_aggregate(&mut conn, aggregate_id).await {
        Ok(events) => {
            let items: Vec<_> = events.iter().map(dto::event_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "events": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default)]
    after: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

async fn event_stream(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StreamQuery>,
) -> axum::response::Response {
    let mut conn = match services.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            return errors::ledger_error_to_response(LedgerError::storage(e.to_string()))
        }
    };

    match EventLog::after_sequence(&mut conn, query.after, query.limit.clamp(1, 500)).await {
        Ok(events) => {
            let next_cursor = events.last().map(|e| e.sequence_number);
            let items: Vec<_> = events.iter().map(dto::event_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "events": items, "next_cursor": next_cursor })),
            )
                .into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
