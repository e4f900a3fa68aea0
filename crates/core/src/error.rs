//! Ledger error model.
//!
//! `LedgerError` covers the failures the posting engine, the stores, and the
//! webhook surface can hand back to a caller. Validation and invariant kinds
//! are deterministic; `Storage` wraps infrastructure failures mapped at the
//! store boundary.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error produced by the ledger core.
///
/// Validation kinds surface before any state change; `VersionConflict` is
/// surfaced as-is so the caller decides whether to retry; `Storage` aborts
/// the enclosing posting unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A transaction lookup missed.
    #[error("transaction not found")]
    TransactionNotFound,

    /// An account lookup missed.
    #[error("account not found")]
    AccountNotFound,

    /// A referenced account code is unknown or inactive.
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    /// sum(debits) != sum(credits).
    #[error("unbalanced transaction: debits must equal credits")]
    UnbalancedTransaction,

    /// Mixed currencies in one transaction.
    #[error("invalid currency: {0}")]
    InvalidCurrency(String),

    /// Fewer lines than the operation's minimum.
    #[error("transaction requires at least {required} lines")]
    EmptyTransactionLines { required: usize },

    /// A balance compare-and-swap lost against a concurrent writer.
    /// The engine does not retry internally.
    #[error("version conflict on account balance")]
    VersionConflict,

    /// The tenant carries no webhook subscription.
    #[error("webhook not configured for tenant")]
    WebhookNotConfigured,

    /// A delivered webhook cannot be retried.
    #[error("webhook already delivered")]
    WebhookAlreadyDelivered,

    /// A delivery has used up all of its attempts.
    #[error("webhook retries exhausted")]
    WebhookRetriesExhausted,

    /// A tenant lookup missed.
    #[error("tenant not found")]
    TenantNotFound,

    /// Infrastructure failure (database, pool). Aborts the posting unit.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_account(code: impl Into<String>) -> Self {
        Self::InvalidAccount(code.into())
    }

    pub fn invalid_currency(msg: impl Into<String>) -> Self {
        Self::InvalidCurrency(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for deterministic request failures (as opposed to
    /// infrastructure faults).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
