//! Request bodies and JSON response mapping.
//!
//! Monetary amounts cross the wire as JSON strings (`"1000"` or
//! `"1000.5000"`); responses serialize them the same way.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use ledgerd_accounting::{Account, LineEntry, Side};
use ledgerd_events::EventRecord;
use ledgerd_infra::store::balances::{AccountBalance, BalanceSummary};
use ledgerd_infra::store::transactions::{LineWithAccount, TransactionPage, TransactionRecord};
use ledgerd_infra::store::{Tenant, WebhookDelivery};

#[derive(Debug, Deserialize)]
pub struct PostSimpleBody {
    pub idempotency_key: String,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub account_code: String,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct LineEntryBody {
    pub account_code: String,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl From<LineEntryBody> for LineEntry {
    fn from(body: LineEntryBody) -> Self {
        LineEntry {
            account_code: body.account_code,
            amount: body.amount,
            side: body.side,
            currency: body.currency,
            metadata: body.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostDoubleEntryBody {
    pub idempotency_key: String,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub entries: Vec<LineEntryBody>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountBody {
    pub code: String,
    pub name: String,
    pub account_type: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantBody {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub fn tenant_to_json(tenant: &Tenant) -> serde_json::Value {
    json!({
        "id": tenant.id,
        "slug": tenant.slug,
        "name": tenant.name,
        "base_currency": tenant.base_currency,
        "created_at": tenant.created_at,
        "updated_at": tenant.updated_at,
    })
}

pub fn transaction_to_json(record: &TransactionRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "idempotency_key": record.idempotency_key,
        "description": record.description,
        "reference": record.reference,
        "status": record.status,
        "posted_at": record.posted_at,
        "metadata": record.metadata,
        "created_at": record.created_at,
    })
}

pub fn transaction_page_to_json(page: &TransactionPage) -> serde_json::Value {
    json!({
        "transactions": page.transactions.iter().map(transaction_to_json).collect::<Vec<_>>(),
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "has_more": page.has_more,
        },
    })
}

pub fn line_to_json(line: &LineWithAccount) -> serde_json::Value {
    json!({
        "id": line.id,
        "account_id": line.account_id,
        "account_code": line.account_code,
        "account_name": line.account_name,
        "amount": line.amount,
        "side": line.side,
        "currency": line.currency,
        "metadata": line.metadata,
        "created_at": line.created_at,
    })
}

pub fn account_to_json(account: &Account) -> serde_json::Value {
    json!({
        "id": account.id,
        "code": account.code,
        "name": account.name,
        "account_type": account.account_type,
        "parent_id": account.parent_id,
        "currency": account.currency,
        "is_active": account.is_active,
        "metadata": account.metadata,
        "created_at": account.created_at,
        "updated_at": account.updated_at,
    })
}

pub fn balance_to_json(balance: &AccountBalance) -> serde_json::Value {
    json!({
        "account_id": balance.account_id,
        "currency": balance.currency,
        "balance": balance.balance,
        "version": balance.version,
        "updated_at": balance.updated_at,
    })
}

pub fn summary_to_json(summary: &BalanceSummary) -> serde_json::Value {
    json!({
        "currency": summary.currency,
        "total_accounts": summary.total_accounts,
        "total_assets": summary.total_assets,
        "total_liabilities": summary.total_liabilities,
        "total_equity": summary.total_equity,
        "total_revenue": summary.total_revenue,
        "total_expenses": summary.total_expenses,
        "net_worth": summary.net_worth(),
    })
}

pub fn event_to_json(event: &EventRecord) -> serde_json::Value {
    json!({
        "event_id": event.event_id,
        "aggregate_id": event.aggregate_id,
        "aggregate_type": event.aggregate_type,
        "event_type": event.event_type,
        "event_version": event.event_version,
        "event_data": event.event_data,
        "metadata": event.metadata,
        "sequence_number": event.sequence_number,
        "created_at": event.created_at,
    })
}

pub fn delivery_to_json(delivery: &WebhookDelivery) -> serde_json::Value {
    json!({
        "id": delivery.id,
        "event_id": delivery.event_id,
        "url": delivery.url,
        "attempts": delivery.attempts,
        "max_attempts": delivery.max_attempts,
        "http_status_code": delivery.http_status_code,
        "next_retry_at": delivery.next_retry_at,
        "delivered_at": delivery.delivered_at,
        "failed_at": delivery.failed_at,
        "created_at": delivery.created_at,
    })
}
