//! Transaction and transaction-line persistence.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};

use ledgerd_accounting::{Side, TransactionStatus};
use ledgerd_core::{
    AccountId, LedgerError, LedgerResult, TenantId, TransactionId, TransactionLineId,
};

use super::map_sqlx_error;

const TRANSACTION_COLUMNS: &str = "id, tenant_id, idempotency_key, description, reference, \
                                   status, posted_at, metadata, created_at";

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub idempotency_key: String,
    pub description: String,
    pub reference: Option<String>,
    pub status: TransactionStatus,
    pub posted_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = TransactionStatus::parse(&status)
            .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?;

        Ok(TransactionRecord {
            id: TransactionId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            idempotency_key: row.try_get("idempotency_key")?,
            description: row.try_get("description")?,
            reference: row.try_get("reference")?,
            status,
            posted_at: row.try_get("posted_at")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A persisted line joined with its account's code and name.
#[derive(Debug, Clone, Serialize)]
pub struct LineWithAccount {
    pub id: TransactionLineId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for LineWithAccount {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let side: String = row.try_get("side")?;
        let side = Side::parse(&side).map_err(|e| sqlx::Error::Decode(e.to_string().into()))?;

        Ok(LineWithAccount {
            id: TransactionLineId::from_uuid(row.try_get("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
            account_id: AccountId::from_uuid(row.try_get("account_id")?),
            account_code: row.try_get("account_code")?,
            account_name: row.try_get("account_name")?,
            amount: row.try_get("amount")?,
            side,
            currency: row.try_get("currency")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub idempotency_key: String,
    pub description: String,
    pub reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewLine {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_code: Option<String>,
    pub posted_after: Option<NaiveDate>,
    pub posted_before: Option<NaiveDate>,
}

/// A page of transactions plus the total matching-row count
/// (from an explicit COUNT query, not the page length).
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// Tenant-scoped transaction store.
#[derive(Debug, Clone, Copy)]
pub struct TransactionStore {
    tenant_id: TenantId,
}

impl TransactionStore {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Insert a transaction in status=pending.
    ///
    /// A unique violation on (tenant, idempotency_key) means a concurrent
    /// posting with the same key won the race; that surfaces as
    /// [`CreateOutcome::DuplicateKey`] so the engine can re-read the winner.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        new: &NewTransaction,
    ) -> LedgerResult<CreateOutcome> {
        let result = sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            INSERT INTO transactions (id, tenant_id, idempotency_key, description,
                                      reference, status, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(TransactionId::new().as_uuid())
        .bind(self.tenant_id.as_uuid())
        .bind(&new.idempotency_key)
        .bind(&new.description)
        .bind(&new.reference)
        .bind(&new.metadata)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(CreateOutcome::Created(record)),
            Err(e) if super::is_unique_violation(&e) => Ok(CreateOutcome::DuplicateKey),
            Err(e) => Err(map_sqlx_error("create_transaction", e)),
        }
    }

    pub async fn get_by_idempotency_key(
        &self,
        conn: &mut PgConnection,
        key: &str,
    ) -> LedgerResult<Option<TransactionRecord>> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE tenant_id = $1 AND idempotency_key = $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(key)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_transaction_by_idempotency_key", e))
    }

    pub async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: TransactionId,
    ) -> LedgerResult<Option<TransactionRecord>> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE tenant_id = $1 AND id = $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_transaction_by_id", e))
    }

    /// Transition status; stamps `posted_at` iff the new status is posted.
    pub async fn update_status(
        &self,
        conn: &mut PgConnection,
        id: TransactionId,
        status: TransactionStatus,
    ) -> LedgerResult<TransactionRecord> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            UPDATE transactions
            SET status = $3,
                posted_at = CASE WHEN $3 = 'posted' THEN now() ELSE posted_at END
            WHERE tenant_id = $1 AND id = $2
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("update_transaction_status", e))?
        .ok_or(LedgerError::TransactionNotFound)
    }

    pub async fn create_line(
        &self,
        conn: &mut PgConnection,
        new: &NewLine,
    ) -> LedgerResult<TransactionLineId> {
        let id = TransactionLineId::new();
        sqlx::query(
            r#"
            INSERT INTO transaction_lines (id, tenant_id, transaction_id, account_id,
                                           amount, side, currency, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.as_uuid())
        .bind(self.tenant_id.as_uuid())
        .bind(new.transaction_id.as_uuid())
        .bind(new.account_id.as_uuid())
        .bind(new.amount)
        .bind(new.side.as_str())
        .bind(&new.currency)
        .bind(&new.metadata)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("create_transaction_line", e))?;

        Ok(id)
    }

    /// Lines of a transaction joined with account code/name, insertion order.
    pub async fn lines(
        &self,
        conn: &mut PgConnection,
        transaction_id: TransactionId,
    ) -> LedgerResult<Vec<LineWithAccount>> {
        sqlx::query_as::<_, LineWithAccount>(
            r#"
            SELECT l.id, l.transaction_id, l.account_id, a.code AS account_code,
                   a.name AS account_name, l.amount, l.side, l.currency, l.metadata,
                   l.created_at
            FROM transaction_lines l
            JOIN accounts a ON a.id = l.account_id
            WHERE l.tenant_id = $1 AND l.transaction_id = $2
            ORDER BY l.created_at ASC, l.id ASC
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(transaction_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("get_transaction_lines", e))
    }

    pub async fn list(
        &self,
        conn: &mut PgConnection,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<TransactionPage> {
        let account_filter = filter.account_code.as_deref();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT t.id)
            FROM transactions t
            LEFT JOIN transaction_lines l ON l.transaction_id = t.id
            LEFT JOIN accounts a ON a.id = l.account_id
            WHERE t.tenant_id = $1
                AND ($2::text IS NULL OR a.code = $2)
                AND ($3::date IS NULL OR t.posted_at >= $3)
                AND ($4::date IS NULL OR t.posted_at < $4 + interval '1 day')
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_filter)
        .bind(filter.posted_after)
        .bind(filter.posted_before)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("count_transactions", e))?;

        let transactions = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT DISTINCT t.id, t.tenant_id, t.idempotency_key, t.description,
                   t.reference, t.status, t.posted_at, t.metadata, t.created_at
            FROM transactions t
            LEFT JOIN transaction_lines l ON l.transaction_id = t.id
            LEFT JOIN accounts a ON a.id = l.account_id
            WHERE t.tenant_id = $1
                AND ($2::text IS NULL OR a.code = $2)
                AND ($3::date IS NULL OR t.posted_at >= $3)
                AND ($4::date IS NULL OR t.posted_at < $4 + interval '1 day')
            ORDER BY t.created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(self.tenant_id.as_uuid())
        .bind(account_filter)
        .bind(filter.posted_after)
        .bind(filter.posted_before)
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        let has_more = total > offset + limit;
        Ok(TransactionPage {
            transactions,
            total,
            limit,
            offset,
            has_more,
        })
    }
}

/// Result of a pending-transaction insert.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(TransactionRecord),
    /// A parallel posting with the same idempotency key committed first;
    /// re-read and return the winner's record.
    DuplicateKey,
}
