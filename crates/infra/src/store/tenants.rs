//! Tenant catalog.
//!
//! Tenants are the isolation namespace; the catalog itself is the only
//! store that is not tenant-scoped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};

use ledgerd_core::{LedgerError, LedgerResult, TenantId};

use super::map_sqlx_error;

#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub base_currency: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Tenant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Tenant {
            id: TenantId::from_uuid(row.try_get("id")?),
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            base_currency: row.try_get("base_currency")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub slug: String,
    pub name: String,
    pub base_currency: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TenantCatalog;

impl TenantCatalog {
    pub async fn create(&self, conn: &mut PgConnection, new: NewTenant) -> LedgerResult<Tenant> {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, slug, name, base_currency, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, slug, name, base_currency, metadata, created_at, updated_at
            "#,
        )
        .bind(TenantId::new().as_uuid())
        .bind(&new.slug)
        .bind(&new.name)
        .bind(&new.base_currency)
        .bind(&new.metadata)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                LedgerError::validation(format!("tenant slug {:?} already exists", new.slug))
            } else {
                map_sqlx_error("create_tenant", e)
            }
        })
    }

    pub async fn get_by_slug(
        &self,
        conn: &mut PgConnection,
        slug: &str,
    ) -> LedgerResult<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, slug, name, base_currency, metadata, created_at, updated_at
            FROM tenants
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_tenant_by_slug", e))
    }

    pub async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: TenantId,
    ) -> LedgerResult<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, slug, name, base_currency, metadata, created_at, updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("get_tenant_by_id", e))
    }

    pub async fn update_metadata(
        &self,
        conn: &mut PgConnection,
        id: TenantId,
        metadata: &serde_json::Value,
    ) -> LedgerResult<Tenant> {
        sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET metadata = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, slug, name, base_currency, metadata, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(metadata)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("update_tenant_metadata", e))?
        .ok_or(LedgerError::TenantNotFound)
    }
}
