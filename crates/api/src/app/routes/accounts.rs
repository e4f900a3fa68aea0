use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use ledgerd_accounting::AccountType;
use ledgerd_core::AccountId;
use ledgerd_infra::store::accounts::AccountFilter;
use ledgerd_infra::{CreateAccountRequest, UpdateAccountRequest};

use crate::app::{dto, errors};
use crate::context::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/hierarchy", get(account_hierarchy))
        .route("/accounts/summary", get(balance_summary))
        .route("/accounts/:id", get(get_account).patch(update_account))
        .route("/accounts/:id/deactivate", post(deactivate_account))
        .route("/accounts/:id/balance", get(account_balance))
        .route("/accounts/:id/balances", get(account_balances))
}

async fn create_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Json(body): Json<dto::CreateAccountBody>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let account_type = match AccountType::parse(&body.account_type) {
        Ok(t) => t,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let req = CreateAccountRequest {
        code: body.code,
        name: body.name,
        account_type,
        parent_code: body.parent_code,
        currency: body.currency,
        metadata: body.metadata,
    };

    match services.chart.create_account(&tenant, req).await {
        Ok(account) => (StatusCode::CREATED, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "type")]
    account_type: Option<String>,
    parent_id: Option<AccountId>,
    #[serde(default)]
    include_inactive: bool,
    search: Option<String>,
}

async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let account_type = match query.account_type.as_deref().map(AccountType::parse) {
        Some(Ok(t)) => Some(t),
        Some(Err(e)) => return errors::ledger_error_to_response(e),
        None => None,
    };

    let filter = AccountFilter {
        account_type,
        parent_id: query.parent_id,
        active_only: !query.include_inactive,
        search: query.search,
    };

    match services.chart.list_accounts(&tenant, &filter).await {
        Ok(accounts) => {
            let items: Vec<_> = accounts.iter().map(dto::account_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "accounts": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn account_hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.chart.account_hierarchy(&tenant).await {
        Ok(tree) => {
            let items: Vec<_> = tree
                .iter()
                .map(|(account, depth)| {
                    let mut value = dto::account_to_json(account);
                    value["depth"] = serde_json::json!(depth);
                    value
                })
                .collect();
            (StatusCode::OK, Json(serde_json::json!({ "accounts": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    currency: Option<String>,
}

async fn balance_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services
        .chart
        .balance_summary(&tenant, query.currency.as_deref())
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(dto::summary_to_json(&summary))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, AccountId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.chart.get_account(&tenant, id).await {
        Ok(account) => (StatusCode::OK, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn update_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, AccountId)>,
    Json(body): Json<dto::UpdateAccountBody>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let req = UpdateAccountRequest {
        name: body.name,
        metadata: body.metadata,
    };

    match services.chart.update_account(&tenant, id, req).await {
        Ok(account) => (StatusCode::OK, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn deactivate_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, AccountId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.chart.deactivate_account(&tenant, id).await {
        Ok(account) => (StatusCode::OK, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct BalanceQuery {
    currency: Option<String>,
}

async fn account_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, AccountId)>,
    Query(query): Query<BalanceQuery>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let currency = query
        .currency
        .unwrap_or_else(|| tenant.base_currency.clone());

    match services.chart.account_balance(&tenant, id, &currency).await {
        Ok(balance) => (StatusCode::OK, Json(dto::balance_to_json(&balance))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

async fn account_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Path((slug, id)): Path<(String, AccountId)>,
) -> axum::response::Response {
    let tenant = match services.resolve_tenant(&slug).await {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services.chart.account_balances(&tenant, id).await {
        Ok(balances) => {
            let items: Vec<_> = balances.iter().map(dto::balance_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "balances": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
