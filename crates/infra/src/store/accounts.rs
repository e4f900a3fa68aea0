//! Account rows: chart-of-accounts persistence.

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};

use ledgerd_accounting::{Account, AccountType};
use ledgerd_core::{AccountId, LedgerError, LedgerResult, TenantId};

use super::map_sqlx_error;

const ACCOUNT_COLUMNS: &str = "id, tenant_id, code, name, account_type, parent_id, \
                               currency, is_active, metadata, created_at, updated_at";

pub(crate) struct AccountRow(pub Account);

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let account_type: String = row.try_get("account_type")?;
        let account_type = AccountType::parse(&account_type)
            .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?;
        let parent_id: Option<uuid::Uuid> = row.try_get("parent_id")?;

        Ok(AccountRow(Account {
            id: AccountId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            account_type,
            parent_id: parent_id.map(AccountId::from_uuid),
            currency: row.try_get("currency")?,
            is_active: row.try_get("is_active")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

struct HierarchyRow {
    account: Account,
    depth: i32,
}

impl<'r> FromRow<'r, PgRow> for HierarchyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(HierarchyRow {
            account: AccountRow::from_row(row)?.0,
            depth: row.try_get("depth")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<AccountId>,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub parent_id: Option<AccountId>,
    pub active_only: bool,
    /// Case-insensitive substring match on code or name.
    pub search: Option<String>,
}

/// Tenant-scoped account store.
#[derive(Debug, Clone, Copy)]
pub struct AccountStore {
    tenant_id: TenantId,
}

impl AccountStore {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub async fn create(&self, conn: &mut PgConnection, new: NewAccount) -> LedgerResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (id, tenant_id, code, name, account_type, parent_id,
                                  currency, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(AccountId::new().as_uuid())
        .bind(self.tenant_id.as_uuid())
        .bind(&new.code)
        .bind(&new.name)
        .bind(new.account_type.as_str())
        .bind(new.parent_id.map(|p| *p.as_uuid()))
        .bind(&new.currency)
        .bind(&new.metadata)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                LedgerError::validation(format!("account code {:?} already exists", new.code))
            } else {
                map_sqlx_error("create_account", e)
            }
        })?;

        Ok(row.0)
    }

    pub async fn get_by_code(
        &self,
        conn: &mut PgConnection,
        code: &str,
    ) -> LedgerResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE tenant_id = $1 AND code = $2 AND is_active
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(code)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_account_by_code", e))?;

        Ok(row.map(|r| r.0))
    }

    pub async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: AccountId,
    ) -> LedgerResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE tenant_id = $1 AND id = $2
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_account_by_id", e))?;

        Ok(row.map(|r| r.0))
    }

    pub async fn list(
        &self,
        conn: &mut PgConnection,
        filter: &AccountFilter,
    ) -> LedgerResult<Vec<Account>> {
        let search = filter.search.as_ref().map(|s| format!("%{s}%"));
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE tenant_id = $1
                AND ($2::text IS NULL OR account_type = $2)
                AND ($3::uuid IS NULL OR parent_id = $3)
                AND (NOT $4 OR is_active)
                AND ($5::text IS NULL OR code ILIKE $5 OR name ILIKE $5)
            ORDER BY code ASC
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(filter.account_type.map(|t| t.as_str()))
        .bind(filter.parent_id.map(|p| *p.as_uuid()))
        .bind(filter.active_only)
        .bind(search)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("list_accounts", e))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Active children of an account.
    pub async fn children(
        &self,
        conn: &mut PgConnection,
        parent_id: AccountId,
    ) -> LedgerResult<Vec<Account>> {
        self.list(
            conn,
            &AccountFilter {
                parent_id: Some(parent_id),
                active_only: true,
                ..AccountFilter::default()
            },
        )
        .await
    }

    /// The active account tree in depth-first code order (recursive CTE
    /// rooted at parentless accounts). Returns each account with its depth.
    pub async fn hierarchy(&self, conn: &mut PgConnection) -> LedgerResult<Vec<(Account, i32)>> {
        let rows = sqlx::query_as::<_, HierarchyRow>(&format!(
            r#"
            WITH RECURSIVE tree AS (
                SELECT {ACCOUNT_COLUMNS}, 0 AS depth, code::text AS path
                FROM accounts
                WHERE tenant_id = $1 AND parent_id IS NULL AND is_active
                UNION ALL
                SELECT a.id, a.tenant_id, a.code, a.name, a.account_type, a.parent_id,
                       a.currency, a.is_active, a.metadata, a.created_at, a.updated_at,
                       tree.depth + 1, tree.path || '.' || a.code
                FROM accounts a
                JOIN tree ON a.parent_id = tree.id
                WHERE a.tenant_id = $1 AND a.is_active
            )
            SELECT {ACCOUNT_COLUMNS}, depth FROM tree ORDER BY path ASC
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("account_hierarchy", e))?;

        Ok(rows.into_iter().map(|r| (r.account, r.depth)).collect())
    }

    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: AccountId,
        changes: &AccountChanges,
    ) -> LedgerResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($3, name),
                metadata = COALESCE($4, metadata),
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(&changes.name)
        .bind(&changes.metadata)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("update_account", e))?
        .ok_or(LedgerError::AccountNotFound)?;

        Ok(row.0)
    }

    pub async fn deactivate(&self, conn: &mut PgConnection, id: AccountId) -> LedgerResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE accounts
            SET is_active = FALSE, updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(self.tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("deactivate_account", e))?
        .ok_or(LedgerError::AccountNotFound)?;

        Ok(row.0)
    }
}
