//! Per-(account, currency) balance rows.
//!
//! Rows are created lazily at version 0 and mutated only under a row lock
//! plus a compare-and-swap on `version`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};

use ledgerd_core::{AccountId, LedgerResult, TenantId};

use super::map_sqlx_error;

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub currency: String,
    pub balance: Decimal,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountBalance {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountBalance {
            account_id: AccountId::from_uuid(row.try_get("account_id")?),
            currency: row.try_get("currency")?,
            balance: row.try_get("balance")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Per-type totals; the only reporting aggregation the ledger carries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BalanceSummary {
    pub currency: Option<String>,
    pub total_accounts: i64,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
}

impl BalanceSummary {
    pub fn net_worth(&self) -> Decimal {
        self.total_assets - self.total_liabilities
    }
}

/// Tenant-scoped balance store.
#[derive(Debug, Clone, Copy)]
pub struct BalanceStore {
    tenant_id: TenantId,
}

impl BalanceStore {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub async fn get(
        &self,
        conn: &mut PgConnection,
        account_id: AccountId,
        currency: &str,
    ) -> LedgerResult<Option<AccountBalance>> {
        sqlx::query_as::<_, AccountBalance>(
            r#"
            SELECT account_id, currency, balance, version, updated_at
            FROM account_balances
            WHERE tenant_id = $1 AND account_id = $2 AND currency = $3
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(currency)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_account_balance", e))
    }

    /// Read a balance row under `FOR UPDATE`; concurrent postings touching
    /// the same key serialize here.
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        account_id: AccountId,
        currency: &str,
    ) -> LedgerResult<Option<AccountBalance>> {
        sqlx::query_as::<_, AccountBalance>(
            r#"
            SELECT account_id, currency, balance, version, updated_at
            FROM account_balances
            WHERE tenant_id = $1 AND account_id = $2 AND currency = $3
            FOR UPDATE
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(currency)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_account_balance_for_update", e))
    }

    /// Insert the lazily-created zero row. A concurrent creator is fine;
    /// the caller re-reads with lock afterwards either way.
    pub async fn create_zero(
        &self,
        conn: &mut PgConnection,
        account_id: AccountId,
        currency: &str,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account_balances (account_id, currency, tenant_id, balance, version)
            VALUES ($1, $2, $3, 0, 0)
            ON CONFLICT (account_id, currency) DO NOTHING
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(currency)
        .bind(self.tenant_id.as_uuid())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("create_account_balance", e))?;

        Ok(())
    }

    /// Compare-and-swap the balance. Returns the number of rows updated;
    /// zero means the expected version went stale and the caller must fail
    /// with a version conflict.
    pub async fn update_cas(
        &self,
        conn: &mut PgConnection,
        account_id: AccountId,
        currency: &str,
        new_balance: Decimal,
        expected_version: i64,
    ) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE account_balances
            SET balance = $4, version = version + 1, updated_at = now()
            WHERE tenant_id = $1 AND account_id = $2 AND currency = $3
                AND version = $5
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(currency)
        .bind(new_balance)
        .bind(expected_version)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("update_account_balance", e))?;

        Ok(result.rows_affected())
    }

    /// Every currency balance held by one account.
    pub async fn list_for_account(
        &self,
        conn: &mut PgConnection,
        account_id: AccountId,
    ) -> LedgerResult<Vec<AccountBalance>> {
        sqlx::query_as::<_, AccountBalance>(
            r#"
            SELECT account_id, currency, balance, version, updated_at
            FROM account_balances
            WHERE tenant_id = $1 AND account_id = $2
            ORDER BY currency ASC
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("list_account_balances", e))
    }

    /// Trivial per-type sums, optionally restricted to one currency.
    pub async fn summary(
        &self,
        conn: &mut PgConnection,
        currency: Option<&str>,
    ) -> LedgerResult<BalanceSummary> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(DISTINCT b.account_id) AS total_accounts,
                COALESCE(SUM(b.balance) FILTER (WHERE a.account_type = 'asset'), 0) AS total_assets,
                COALESCE(SUM(b.balance) FILTER (WHERE a.account_type = 'liability'), 0) AS total_liabilities,
                COALESCE(SUM(b.balance) FILTER (WHERE a.account_type = 'equity'), 0) AS total_equity,
                COALESCE(SUM(b.balance) FILTER (WHERE a.account_type = 'revenue'), 0) AS total_revenue,
                COALESCE(SUM(b.balance) FILTER (WHERE a.account_type = 'expense'), 0) AS total_expenses
            FROM account_balances b
            JOIN accounts a ON a.id = b.account_id
            WHERE b.tenant_id = $1 AND ($2::text IS NULL OR b.currency = $2)
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(currency)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("balance_summary", e))?;

        let decode = |e: sqlx::Error| map_sqlx_error("decode_balance_summary", e);
        Ok(BalanceSummary {
            currency: currency.map(str::to_string),
            total_accounts: row.try_get("total_accounts").map_err(decode)?,
            total_assets: row.try_get("total_assets").map_err(decode)?,
            total_liabilities: row.try_get("total_liabilities").map_err(decode)?,
            total_equity: row.try_get("total_equity").map_err(decode)?,
            total_revenue: row.try_get("total_revenue").map_err(decode)?,
            total_expenses: row.try_get("total_expenses").map_err(decode)?,
        })
    }
}
