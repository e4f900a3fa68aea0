//! Connection pool construction and schema bootstrap.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledgerd_core::{LedgerError, LedgerResult};

use crate::config::Config;

/// Build the connection pool and verify connectivity.
pub async fn connect(cfg: &Config) -> LedgerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database_max_connections)
        .min_connections(5)
        .idle_timeout(cfg.database_max_idle_time)
        .max_lifetime(Duration::from_secs(3600))
        .acquire_timeout(Duration::from_secs(5))
        .connect(&cfg.database_url)
        .await
        .map_err(|e| LedgerError::storage(format!("failed to connect: {e}")))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| LedgerError::storage(format!("failed to ping database: {e}")))?;

    Ok(pool)
}

/// Create tables and indexes if they do not exist.
///
/// Statements are idempotent; there is no migration tooling.
pub async fn ensure_schema(pool: &PgPool) -> LedgerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| LedgerError::storage(format!("schema bootstrap failed: {e}")))?;
    }
    Ok(())
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id            UUID PRIMARY KEY,
        slug          TEXT NOT NULL UNIQUE,
        name          TEXT NOT NULL,
        base_currency TEXT NOT NULL,
        metadata      JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id           UUID PRIMARY KEY,
        tenant_id    UUID NOT NULL REFERENCES tenants(id),
        code         TEXT NOT NULL,
        name         TEXT NOT NULL,
        account_type TEXT NOT NULL CHECK (account_type IN
                         ('asset', 'liability', 'equity', 'revenue', 'expense')),
        parent_id    UUID REFERENCES accounts(id),
        currency     TEXT NOT NULL,
        is_active    BOOLEAN NOT NULL DEFAULT TRUE,
        metadata     JSONB,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS accounts_tenant_code_active_idx
        ON accounts (tenant_id, code) WHERE is_active
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS accounts_tenant_parent_idx
        ON accounts (tenant_id, parent_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id              UUID PRIMARY KEY,
        tenant_id       UUID NOT NULL REFERENCES tenants(id),
        idempotency_key TEXT NOT NULL,
        description     TEXT NOT NULL,
        reference       TEXT,
        status          TEXT NOT NULL CHECK (status IN ('pending', 'posted', 'failed')),
        posted_at       TIMESTAMPTZ,
        metadata        JSONB,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS transactions_tenant_idempotency_idx
        ON transactions (tenant_id, idempotency_key)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_posted_at_idx
        ON transactions (tenant_id, posted_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction_lines (
        id             UUID PRIMARY KEY,
        tenant_id      UUID NOT NULL REFERENCES tenants(id),
        transaction_id UUID NOT NULL REFERENCES transactions(id),
        account_id     UUID NOT NULL REFERENCES accounts(id),
        amount         NUMERIC(20, 4) NOT NULL CHECK (amount > 0),
        side           TEXT NOT NULL CHECK (side IN ('debit', 'credit')),
        currency       TEXT NOT NULL,
        metadata       JSONB,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transaction_lines_transaction_idx
        ON transaction_lines (transaction_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transaction_lines_account_idx
        ON transaction_lines (tenant_id, account_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_balances (
        account_id UUID NOT NULL REFERENCES accounts(id),
        currency   TEXT NOT NULL,
        tenant_id  UUID NOT NULL REFERENCES tenants(id),
        balance    NUMERIC(20, 4) NOT NULL DEFAULT 0,
        version    BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (account_id, currency)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        event_id        UUID PRIMARY KEY,
        tenant_id       UUID NOT NULL REFERENCES tenants(id),
        aggregate_id    UUID NOT NULL,
        aggregate_type  TEXT NOT NULL CHECK (aggregate_type IN
                            ('transaction', 'account', 'balance')),
        event_type      TEXT NOT NULL,
        event_version   INTEGER NOT NULL,
        event_data      JSONB NOT NULL,
        metadata        JSONB NOT NULL DEFAULT '{}'::jsonb,
        sequence_number BIGSERIAL UNIQUE,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS events_tenant_aggregate_idx
        ON events (tenant_id, aggregate_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS events_tenant_type_idx
        ON events (tenant_id, event_type)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS webhook_deliveries (
        id               UUID PRIMARY KEY,
        tenant_id        UUID NOT NULL REFERENCES tenants(id),
        event_id         UUID NOT NULL REFERENCES events(event_id),
        url              TEXT NOT NULL,
        max_attempts     INTEGER NOT NULL DEFAULT 3,
        attempts         INTEGER NOT NULL DEFAULT 0,
        http_status_code INTEGER,
        response_body    TEXT,
        next_retry_at    TIMESTAMPTZ,
        delivered_at     TIMESTAMPTZ,
        failed_at        TIMESTAMPTZ,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS webhook_deliveries_due_idx
        ON webhook_deliveries (next_retry_at) WHERE next_retry_at IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS webhook_deliveries_tenant_idx
        ON webhook_deliveries (tenant_id)
    "#,
];
