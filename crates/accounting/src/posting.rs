//! Posting vocabulary and validation.
//!
//! Pure domain logic only: no IO, no persistence concerns. The posting
//! engine feeds request lines through these checks before touching any
//! store, and routes every balance mutation through [`signed_delta`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerd_core::{LedgerError, LedgerResult};

use crate::account::AccountType;

/// One side of a transaction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Debit => "debit",
            Side::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "debit" => Ok(Side::Debit),
            "credit" => Ok(Side::Credit),
            other => Err(LedgerError::validation(format!(
                "side must be debit or credit (got {other:?})"
            ))),
        }
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Posted,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Posted => "posted",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "posted" => Ok(TransactionStatus::Posted),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(LedgerError::validation(format!(
                "unknown transaction status {other:?}"
            ))),
        }
    }
}

/// One requested line of a posting: account by code, a strictly positive
/// amount, and the side it lands on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineEntry {
    pub account_code: String,
    pub amount: Decimal,
    pub side: Side,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The signed delta a line applies to its account's balance.
///
/// This is the sole place where account type and side interact:
///
/// | type | debit | credit |
/// |---|---|---|
/// | asset, expense | +amount | -amount |
/// | liability, equity, revenue | -amount | +amount |
pub fn signed_delta(account_type: AccountType, side: Side, amount: Decimal) -> Decimal {
    match (account_type, side) {
        (AccountType::Asset | AccountType::Expense, Side::Debit) => amount,
        (AccountType::Asset | AccountType::Expense, Side::Credit) => -amount,
        (AccountType::Liability | AccountType::Equity | AccountType::Revenue, Side::Debit) => {
            -amount
        }
        (AccountType::Liability | AccountType::Equity | AccountType::Revenue, Side::Credit) => {
            amount
        }
    }
}

/// Apply one line to a running balance.
pub fn apply_to_balance(
    balance: Decimal,
    account_type: AccountType,
    side: Side,
    amount: Decimal,
) -> Decimal {
    balance + signed_delta(account_type, side, amount)
}

/// Validate a single-line posting: strictly positive amount.
pub fn validate_simple(entry: &LineEntry) -> LedgerResult<()> {
    validate_amounts_and_currency(std::slice::from_ref(entry), 1)
}

/// Validate a double-entry posting: at least two lines, every amount
/// strictly positive, one currency throughout, and debits equal credits
/// under fixed-precision equality.
pub fn validate_double_entry(entries: &[LineEntry]) -> LedgerResult<()> {
    validate_amounts_and_currency(entries, 2)?;

    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;
    for entry in entries {
        match entry.side {
            Side::Debit => debit_total += entry.amount,
            Side::Credit => credit_total += entry.amount,
        }
    }

    if debit_total != credit_total {
        return Err(LedgerError::UnbalancedTransaction);
    }
    Ok(())
}

fn validate_amounts_and_currency(entries: &[LineEntry], required: usize) -> LedgerResult<()> {
    if entries.len() < required {
        return Err(LedgerError::EmptyTransactionLines { required });
    }

    let base_currency = &entries[0].currency;
    for entry in entries {
        if entry.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("amount must be positive"));
        }
        if &entry.currency != base_currency {
            return Err(LedgerError::invalid_currency(
                "all entries must use the same currency",
            ));
        }
    }
    Ok(())
}
