use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use ledgerd_core::TransactionId;
use ledgerd_infra::store::transactions::TransactionFilter;
use ledgerd_infra::{PostDoubleEntryRequest, PostSimpleRequest};

use crate::app::{dto, errors};
use crate::context::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/transactions/simple", post(post_simple))
        .route("/transactions/double-entry", post(post_double_entry))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
        .route("/transactions/:id/lines", get(get_transaction_lines))
}

async fn post_simple(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Json(body): Json<dto::PostSimpleBody>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let req = PostSimpleRequest {
        idempotency_key: body.idempotency_key,
        description: body.description,
        reference: body.reference,
        account_code: body.account_code,
        amount: body.amount,
        side: body.side,
        currency: body.currency,
        metadata: body.metadata,
    };

    match services.engine.post_simple(&tenant, req).await {
        Ok(record) => (StatusCode::CREATED, Json(dto::transaction_to_json(&record))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn post_double_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Json(body): Json<dto::PostDoubleEntryBody>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let req = PostDoubleEntryRequest {
        idempotency_key: body.idempotency_key,
        description: body.description,
        reference: body.reference,
        entries: body.entries.into_iter().map(Into::into).collect(),
        metadata: body.metadata,
    };

    match services.engine.post_double_entry(&tenant, req).await {
        Ok(record) => (StatusCode::CREATED, Json(dto::transaction_to_json(&record))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    account_code: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let filter = TransactionFilter {
        account_code: query.account_code,
        posted_after: query.start_date,
        posted_before: query.end_date,
    };
    let limit = query.limit.clamp(1, 500);
    let offset = query.offset.max(0);

    match services
        .engine
        .list_transactions(&tenant, &filter, limit, offset)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(dto::transaction_page_to_json(&page))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, TransactionId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.engine.get_transaction(&tenant, id).await {
        Ok(record) => (StatusCode::OK, Json(dto::transaction_to_json(&record))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn get_transaction_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, TransactionId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.engine.get_transaction_lines(&tenant, id).await {
        Ok(lines) => {
            let items: Vec<_> = lines.iter().map(dto::line_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "lines": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
