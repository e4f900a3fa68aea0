//! Tenant-scoped Postgres stores.
//!
//! Every store is a lightweight handle carrying the tenant id; every query
//! filters on it, so cross-tenant access is structurally impossible. All
//! mutations take `&mut PgConnection` so the posting engine can group them
//! under one transaction.

pub mod accounts;
pub mod balances;
pub mod events;
pub mod tenants;
pub mod transactions;
pub mod webhooks;

use ledgerd_core::LedgerError;

pub use accounts::AccountStore;
pub use balances::BalanceStore;
pub use events::EventLog;
pub use tenants::{NewTenant, Tenant, TenantCatalog};
pub use transactions::TransactionStore;
pub use webhooks::{DeliveryStore, WebhookDelivery};

/// Map sqlx errors to the ledger error model.
///
/// Unique violations are handed back as `Storage` here; call sites that
/// expect a racing writer (idempotency key, balance seed) check
/// [`is_unique_violation`] before mapping.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::RowNotFound => {
            LedgerError::storage(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Database(db_err) => {
            LedgerError::storage(format!("database error in {operation}: {}", db_err.message()))
        }
        other => LedgerError::storage(format!("sqlx error in {operation}: {other}")),
    }
}

/// SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
