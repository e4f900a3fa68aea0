//! The posting engine.
//!
//! Orchestrates idempotency probe, validation, line creation, balance
//! compare-and-swap, status promotion, event append and webhook enqueue,
//! all inside one database transaction. Nothing is visible to other
//! readers until the unit commits; any failure aborts the whole unit.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use ledgerd_accounting::{
    apply_to_balance, validate_double_entry, validate_simple, Account, LineEntry, Side,
    TransactionStatus,
};
use ledgerd_core::{AccountId, LedgerError, LedgerResult};
use ledgerd_events::{
    AggregateType, BalanceUpdatedEvent, EventMetadata, EventRecord, EventType, NewEvent,
    TransactionLineEvent, TransactionPostedEvent,
};

use crate::store::transactions::{CreateOutcome, NewLine, NewTransaction, TransactionRecord};
use crate::store::{AccountStore, BalanceStore, EventLog, Tenant, TransactionStore};
use crate::webhook;

/// A single-line posting request.
#[derive(Debug, Clone)]
pub struct PostSimpleRequest {
    pub idempotency_key: String,
    pub description: String,
    pub reference: Option<String>,
    pub account_code: String,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
}

/// An N-line double-entry posting request.
#[derive(Debug, Clone)]
pub struct PostDoubleEntryRequest {
    pub idempotency_key: String,
    pub description: String,
    pub reference: Option<String>,
    pub entries: Vec<LineEntry>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct PostingEngine {
    pool: PgPool,
    webhook_max_attempts: i32,
}

/// Old/new balance for one (account, currency) touched by a posting, in
/// first-touch order. Several lines on the same key collapse into one
/// entry carrying the first `previous` and the last `new`.
struct BalanceChange {
    account_id: AccountId,
    account_code: String,
    account_name: String,
    currency: String,
    previous: Decimal,
    new: Decimal,
    version: i64,
}

impl PostingEngine {
    pub fn new(pool: PgPool, webhook_max_attempts: i32) -> Self {
        Self {
            pool,
            webhook_max_attempts,
        }
    }

    #[instrument(
        skip(self, tenant, req),
        fields(tenant = %tenant.slug, idempotency_key = %req.idempotency_key),
        err
    )]
    pub async fn post_simple(
        &self,
        tenant: &Tenant,
        req: PostSimpleRequest,
    ) -> LedgerResult<TransactionRecord> {
        let entry = LineEntry {
            account_code: req.account_code,
            amount: req.amount,
            side: req.side,
            currency: req.currency,
            metadata: req.metadata.clone(),
        };
        validate_simple(&entry)?;

        let header = NewTransaction {
            idempotency_key: req.idempotency_key,
            description: req.description,
            reference: req.reference,
            metadata: req.metadata,
        };
        self.post(tenant, header, vec![entry]).await
    }

    #[instrument(
        skip(self, tenant, req),
        fields(tenant = %tenant.slug, idempotency_key = %req.idempotency_key, lines = req.entries.len()),
        err
    )]
    pub async fn post_double_entry(
        &self,
        tenant: &Tenant,
        req: PostDoubleEntryRequest,
    ) -> LedgerResult<TransactionRecord> {
        validate_double_entry(&req.entries)?;

        let header = NewTransaction {
            idempotency_key: req.idempotency_key,
            description: req.description,
            reference: req.reference,
            metadata: req.metadata,
        };
        self.post(tenant, header, req.entries).await
    }

    /// The shared posting unit. `entries` have already passed structural
    /// validation.
    async fn post(
        &self,
        tenant: &Tenant,
        header: NewTransaction,
        entries: Vec<LineEntry>,
    ) -> LedgerResult<TransactionRecord> {
        let txn_store = TransactionStore::new(tenant.id);
        let account_store = AccountStore::new(tenant.id);
        let balance_store = BalanceStore::new(tenant.id);
        let event_log = EventLog::new(tenant.id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::storage(format!("failed to begin posting unit: {e}")))?;

        // Idempotency probe: an existing transaction with this key is
        // returned as-is. The only exit path that commits no new state.
        if let Some(existing) = txn_store
            .get_by_idempotency_key(&mut *tx, &header.idempotency_key)
            .await?
        {
            tracing::debug!(transaction_id = %existing.id, "idempotent replay");
            return Ok(existing);
        }

        // Resolve each referenced code once; inactive or unknown codes fail
        // the whole unit.
        let mut accounts_by_code: HashMap<String, Account> = HashMap::new();
        for entry in &entries {
            if !accounts_by_code.contains_key(&entry.account_code) {
                let account = account_store
                    .get_by_code(&mut *tx, &entry.account_code)
                    .await?
                    .ok_or_else(|| LedgerError::invalid_account(entry.account_code.clone()))?;
                accounts_by_code.insert(entry.account_code.clone(), account);
            }
        }

        let record = match txn_store.create(&mut *tx, &header).await? {
            CreateOutcome::Created(record) => record,
            CreateOutcome::DuplicateKey => {
                // A parallel posting with the same key committed between the
                // probe and the insert. Our transaction is aborted; re-read
                // the winner's record on a fresh connection.
                tx.rollback()
                    .await
                    .map_err(|e| LedgerError::storage(format!("rollback failed: {e}")))?;
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| LedgerError::storage(format!("acquire failed: {e}")))?;
                return txn_store
                    .get_by_idempotency_key(&mut *conn, &header.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::storage("idempotency winner not readable after conflict")
                    });
            }
        };

        let mut event_lines: Vec<TransactionLineEvent> = Vec::with_capacity(entries.len());
        let mut changes: Vec<BalanceChange> = Vec::new();

        for entry in &entries {
            let account = &accounts_by_code[&entry.account_code];

            let balance = match balance_store
                .get_for_update(&mut *tx, account.id, &entry.currency)
                .await?
            {
                Some(balance) => balance,
                None => {
                    // Lazily create at version 0, then re-read with the lock.
                    balance_store
                        .create_zero(&mut *tx, account.id, &entry.currency)
                        .await?;
                    balance_store
                        .get_for_update(&mut *tx, account.id, &entry.currency)
                        .await?
                        .ok_or_else(|| {
                            LedgerError::storage("balance row missing after creation")
                        })?
                }
            };

            let line_id = txn_store
                .create_line(
                    &mut *tx,
                    &NewLine {
                        transaction_id: record.id,
                        account_id: account.id,
                        amount: entry.amount,
                        side: entry.side,
                        currency: entry.currency.clone(),
                        metadata: entry.metadata.clone(),
                    },
                )
                .await?;

            let new_balance =
                apply_to_balance(balance.balance, account.account_type, entry.side, entry.amount);

            let rows = balance_store
                .update_cas(
                    &mut *tx,
                    account.id,
                    &entry.currency,
                    new_balance,
                    balance.version,
                )
                .await?;
            if rows == 0 {
                return Err(LedgerError::VersionConflict);
            }

            event_lines.push(TransactionLineEvent {
                id: line_id.to_string(),
                account_id: account.id.to_string(),
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                amount: entry.amount,
                side: entry.side.as_str().to_string(),
                currency: entry.currency.clone(),
                metadata: entry.metadata.clone(),
            });

            match changes
                .iter_mut()
                .find(|c| c.account_id == account.id && c.currency == entry.currency)
            {
                Some(change) => {
                    change.new = new_balance;
                    change.version = balance.version + 1;
                }
                None => changes.push(BalanceChange {
                    account_id: account.id,
                    account_code: account.code.clone(),
                    account_name: account.name.clone(),
                    currency: entry.currency.clone(),
                    previous: balance.balance,
                    new: new_balance,
                    version: balance.version + 1,
                }),
            }
        }

        let record = txn_store
            .update_status(&mut *tx, record.id, TransactionStatus::Posted)
            .await?;
        let posted_at = record
            .posted_at
            .ok_or_else(|| LedgerError::storage("posted_at missing after promotion"))?;

        // One transaction.posted event, then one balance.updated per
        // distinct (account, currency), all in the same unit.
        let total_amount: Decimal = entries
            .iter()
            .filter(|e| e.side == Side::Debit)
            .map(|e| e.amount)
            .sum();
        let metadata = serde_json::to_value(EventMetadata::api())
            .map_err(|e| LedgerError::storage(format!("metadata serialization: {e}")))?;

        let posted_payload = TransactionPostedEvent {
            transaction_id: record.id.to_string(),
            idempotency_key: record.idempotency_key.clone(),
            description: record.description.clone(),
            reference: record.reference.clone(),
            lines: event_lines,
            posted_at,
            currency: entries[0].currency.clone(),
            total_amount,
            metadata: record.metadata.clone(),
        };

        let mut appended: Vec<EventRecord> = Vec::with_capacity(1 + changes.len());
        appended.push(
            event_log
                .append(
                    &mut *tx,
                    NewEvent {
                        aggregate_id: *record.id.as_uuid(),
                        aggregate_type: AggregateType::Transaction,
                        event_type: EventType::TransactionPosted,
                        event_version: 1,
                        event_data: to_event_data(&posted_payload)?,
                        metadata: metadata.clone(),
                    },
                )
                .await?,
        );

        for change in &changes {
            let payload = BalanceUpdatedEvent {
                account_id: change.account_id.to_string(),
                account_code: change.account_code.clone(),
                account_name: change.account_name.clone(),
                currency: change.currency.clone(),
                previous_balance: change.previous,
                new_balance: change.new,
                balance_change: change.new - change.previous,
                updated_by: record.id.to_string(),
                updated_at: posted_at,
                version: change.version,
            };
            appended.push(
                event_log
                    .append(
                        &mut *tx,
                        NewEvent {
                            aggregate_id: *change.account_id.as_uuid(),
                            aggregate_type: AggregateType::Account,
                            event_type: EventType::BalanceUpdated,
                            event_version: 1,
                            event_data: to_event_data(&payload)?,
                            metadata: metadata.clone(),
                        },
                    )
                    .await?,
            );
        }

        webhook::enqueue_for_events(&mut *tx, tenant, &appended, self.webhook_max_attempts).await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::storage(format!("failed to commit posting unit: {e}")))?;

        tracing::info!(transaction_id = %record.id, events = appended.len(), "transaction posted");
        Ok(record)
    }

    pub async fn get_transaction(
        &self,
        tenant: &Tenant,
        id: ledgerd_core::TransactionId,
    ) -> LedgerResult<TransactionRecord> {
        let mut conn = self.acquire().await?;
        TransactionStore::new(tenant.id)
            .get_by_id(&mut *conn, id)
            .await?
            .ok_or(LedgerError::TransactionNotFound)
    }

    pub async fn get_transaction_lines(
        &self,
        tenant: &Tenant,
        id: ledgerd_core::TransactionId,
    ) -> LedgerResult<Vec<crate::store::transactions::LineWithAccount>> {
        let mut conn = self.acquire().await?;
        let store = TransactionStore::new(tenant.id);
        if store.get_by_id(&mut *conn, id).await?.is_none() {
            return Err(LedgerError::TransactionNotFound);
        }
        store.lines(&mut *conn, id).await
    }

    pub async fn list_transactions(
        &self,
        tenant: &Tenant,
        filter: &crate::store::transactions::TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<crate::store::transactions::TransactionPage> {
        let mut conn = self.acquire().await?;
        TransactionStore::new(tenant.id)
            .list(&mut *conn, filter, limit, offset)
            .await
    }

    async fn acquire(&self) -> LedgerResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| LedgerError::storage(format!("acquire failed: {e}")))
    }
}

fn to_event_data<T: serde::Serialize>(payload: &T) -> LedgerResult<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| LedgerError::storage(format!("event serialization: {e}")))
}
