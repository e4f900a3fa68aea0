use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerd_core::{AccountId, LedgerError, LedgerResult, TenantId};

/// High-level account type (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "equity" => Ok(AccountType::Equity),
            "revenue" => Ok(AccountType::Revenue),
            "expense" => Ok(AccountType::Expense),
            other => Err(LedgerError::validation(format!(
                "account type must be one of asset, liability, equity, revenue, expense (got {other:?})"
            ))),
        }
    }
}

/// A chart-of-accounts account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<AccountId>,
    pub currency: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account codes are 1-20 chars, alphanumeric plus hyphen/underscore.
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.is_empty() || code.len() > 20 {
        return Err(LedgerError::validation(
            "account code must be 1-20 characters",
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LedgerError::validation(
            "account code must be alphanumeric with optional hyphens/underscores",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_round_trips_through_str() {
        for t in AccountType::ALL {
            assert_eq!(AccountType::parse(t.as_str()).unwrap(), t);
        }
        assert!(AccountType::parse("contra-asset").is_err());
    }

    #[test]
    fn account_codes_are_validated() {
        assert!(validate_account_code("1000").is_ok());
        assert!(validate_account_code("AR_trade-1").is_ok());
        assert!(validate_account_code("").is_err());
        assert!(validate_account_code("a".repeat(21).as_str()).is_err());
        assert!(validate_account_code("10 00").is_err());
    }

}
