//! Chart-of-accounts service.
//!
//! Account lifecycle plus balance reads. Mutations run in one transaction
//! with their `account.created` / `account.updated` events and any webhook
//! enqueue, mirroring the posting unit's atomicity.

use sqlx::PgPool;
use tracing::instrument;

use ledgerd_accounting::{validate_account_code, Account, AccountType};
use ledgerd_core::{AccountId, LedgerError, LedgerResult};
use ledgerd_events::{AggregateType, EventMetadata, EventType, NewEvent};

use crate::store::accounts::{AccountChanges, AccountFilter, NewAccount};
use crate::store::balances::{AccountBalance, BalanceSummary};
use crate::store::{AccountStore, BalanceStore, EventLog, Tenant};
use crate::webhook;

#[derive(Debug, Clone)]
pub struct CreateAccountRequest {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
    /// Defaults to the tenant's base currency.
    pub currency: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ChartService {
    pool: PgPool,
    webhook_max_attempts: i32,
}

impl ChartService {
    pub fn new(pool: PgPool, webhook_max_attempts: i32) -> Self {
        Self {
            pool,
            webhook_max_attempts,
        }
    }

    #[instrument(skip(self, tenant, req), fields(tenant = %tenant.slug, code = %req.code), err)]
    pub async fn create_account(
        &self,
        tenant: &Tenant,
        req: CreateAccountRequest,
    ) -> LedgerResult<Account> {
        validate_account_code(&req.code)?;

        let currency = req
            .currency
            .unwrap_or_else(|| tenant.base_currency.clone());

        let store = AccountStore::new(tenant.id);
        let balance_store = BalanceStore::new(tenant.id);

        let mut tx = self.begin().await?;

        let parent_id = match &req.parent_code {
            Some(code) => Some(
                store
                    .get_by_code(&mut tx, code)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::validation(format!("parent account {code:?} not found"))
                    })?
                    .id,
            ),
            None => None,
        };

        let account = store
            .create(
                &mut tx,
                NewAccount {
                    code: req.code,
                    name: req.name,
                    account_type: req.account_type,
                    parent_id,
                    currency: currency.clone(),
                    metadata: req.metadata,
                },
            )
            .await?;

        // Seed the default-currency balance row so first reads see zero.
        balance_store
            .create_zero(&mut tx, account.id, &currency)
            .await?;

        self.append_account_event(&mut tx, tenant, &account, EventType::AccountCreated)
            .await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::storage(format!("commit failed: {e}")))?;

        tracing::info!(account_id = %account.id, code = %account.code, "account created");
        Ok(account)
    }

    #[instrument(skip(self, tenant, req), fields(tenant = %tenant.slug, account_id = %id), err)]
    pub async fn update_account(
        &self,
        tenant: &Tenant,
        id: AccountId,
        req: UpdateAccountRequest,
    ) -> LedgerResult<Account> {
        let store = AccountStore::new(tenant.id);
        let mut tx = self.begin().await?;

        let account = store
            .update(
                &mut tx,
                id,
                &AccountChanges {
                    name: req.name,
                    metadata: req.metadata,
                },
            )
            .await?;

        self.append_account_event(&mut tx, tenant, &account, EventType::AccountUpdated)
            .await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::storage(format!("commit failed: {e}")))?;

        Ok(account)
    }

    /// Deactivate an account. Refused while it has active children or any
    /// non-zero balance; rows are never hard-deleted.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug, account_id = %id), err)]
    pub async fn deactivate_account(&self, tenant: &Tenant, id: AccountId) -> LedgerResult<Account> {
        let store = AccountStore::new(tenant.id);
        let balance_store = BalanceStore::new(tenant.id);
        let mut tx = self.begin().await?;

        if !store.children(&mut tx, id).await?.is_empty() {
            return Err(LedgerError::validation(
                "cannot deactivate account with child accounts",
            ));
        }

        let balances = balance_store.list_for_account(&mut tx, id).await?;
        if balances.iter().any(|b| !b.balance.is_zero()) {
            return Err(LedgerError::validation(
                "cannot deactivate account with non-zero balances",
            ));
        }

        let account = store.deactivate(&mut tx, id).await?;

        self.append_account_event(&mut tx, tenant, &account, EventType::AccountUpdated)
            .await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::storage(format!("commit failed: {e}")))?;

        Ok(account)
    }

    pub async fn get_account(&self, tenant: &Tenant, id: AccountId) -> LedgerResult<Account> {
        let mut conn = self.acquire().await?;
        AccountStore::new(tenant.id)
            .get_by_id(&mut conn, id)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn get_account_by_code(&self, tenant: &Tenant, code: &str) -> LedgerResult<Account> {
        let mut conn = self.acquire().await?;
        AccountStore::new(tenant.id)
            .get_by_code(&mut conn, code)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn list_accounts(
        &self,
        tenant: &Tenant,
        filter: &AccountFilter,
    ) -> LedgerResult<Vec<Account>> {
        let mut conn = self.acquire().await?;
        AccountStore::new(tenant.id).list(&mut conn, filter).await
    }

    pub async fn account_hierarchy(&self, tenant: &Tenant) -> LedgerResult<Vec<(Account, i32)>> {
        let mut conn = self.acquire().await?;
        AccountStore::new(tenant.id).hierarchy(&mut conn).await
    }

    /// Balance for one currency, lazily created at zero.
    pub async fn account_balance(
        &self,
        tenant: &Tenant,
        id: AccountId,
        currency: &str,
    ) -> LedgerResult<AccountBalance> {
        let store = AccountStore::new(tenant.id);
        let balance_store = BalanceStore::new(tenant.id);
        let mut conn = self.acquire().await?;

        if store.get_by_id(&mut conn, id).await?.is_none() {
            return Err(LedgerError::AccountNotFound);
        }

        if let Some(balance) = balance_store.get(&mut conn, id, currency).await? {
            return Ok(balance);
        }

        balance_store.create_zero(&mut conn, id, currency).await?;
        balance_store
            .get(&mut conn, id, currency)
            .await?
            .ok_or_else(|| LedgerError::storage("balance row missing after creation"))
    }

    pub async fn account_balances(
        &self,
        tenant: &Tenant,
        id: AccountId,
    ) -> LedgerResult<Vec<AccountBalance>> {
        let mut conn = self.acquire().await?;
        BalanceStore::new(tenant.id)
            .list_for_account(&mut conn, id)
            .await
    }

    pub async fn balance_summary(
        &self,
        tenant: &Tenant,
        currency: Option<&str>,
    ) -> LedgerResult<BalanceSummary> {
        let mut conn = self.acquire().await?;
        BalanceStore::new(tenant.id)
            .summary(&mut conn, currency)
            .await
    }

    async fn append_account_event(
        &self,
        conn: &mut sqlx::PgConnection,
        tenant: &Tenant,
        account: &Account,
        event_type: EventType,
    ) -> LedgerResult<()> {
        let event = EventLog::new(tenant.id)
            .append(
                conn,
                NewEvent {
                    aggregate_id: *account.id.as_uuid(),
                    aggregate_type: AggregateType::Account,
                    event_type,
                    event_version: 1,
                    event_data: serde_json::to_value(account)
                        .map_err(|e| LedgerError::storage(format!("event serialization: {e}")))?,
                    metadata: serde_json::to_value(EventMetadata::api())
                        .map_err(|e| LedgerError::storage(format!("event serialization: {e}")))?,
                },
            )
            .await?;

        webhook::enqueue_for_events(conn, tenant, &[event], self.webhook_max_attempts).await
    }

    async fn begin(&self) -> LedgerResult<sqlx::Transaction<'_, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| LedgerError::storage(format!("failed to begin transaction: {e}")))
    }

    async fn acquire(&self) -> LedgerResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| LedgerError::storage(format!("acquire failed: {e}")))
    }
}
