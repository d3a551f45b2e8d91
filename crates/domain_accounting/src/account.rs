//! Account types for the chart of accounts
//!
//! This module defines the account structure for double-entry bookkeeping.
//! Account numbers follow the French Plan Comptable Général (e.g. `411000`
//! Clients, `707000` Ventes de marchandises).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::AccountId;

use crate::error::AccountingError;

/// Maximum length of an account number
pub const MAX_ACCOUNT_NUMBER_LEN: usize = 20;

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Revenue accounts (credit normal balance)
    Revenue,
    /// Expense accounts (debit normal balance)
    Expense,
    /// Suspense and technical accounts, no conventional side
    Other,
}

impl AccountType {
    /// Conventional balance side for the type
    pub fn default_normal_balance(&self) -> Option<NormalBalance> {
        match self {
            AccountType::Asset | AccountType::Expense => Some(NormalBalance::Debit),
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                Some(NormalBalance::Credit)
            }
            AccountType::Other => None,
        }
    }

    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        self.default_normal_balance() == Some(NormalBalance::Debit)
    }
}

/// Side on which an account's balance is conventionally positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalBalance {
    Debit,
    Credit,
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Account number (immutable key, e.g. "411000")
    pub number: String,
    /// Account name
    pub name: String,
    /// Account type
    pub account_type: AccountType,
    /// Balance side, `None` for accounts without a convention
    pub normal_balance: Option<NormalBalance>,
    /// Description
    pub description: Option<String>,
    /// Whether new entries may reference the account
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new active account with the type's default normal balance
    ///
    /// # Arguments
    ///
    /// * `number` - Account number
    /// * `name` - Account name
    /// * `account_type` - Type of account
    pub fn new(number: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            number: number.into(),
            name: name.into(),
            account_type,
            normal_balance: account_type.default_normal_balance(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overrides the normal balance side
    pub fn with_normal_balance(mut self, normal_balance: Option<NormalBalance>) -> Self {
        self.normal_balance = normal_balance;
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Signs a raw `debit - credit` amount so the normal side reads positive
    pub fn signed_balance(&self, debit_minus_credit: rust_decimal::Decimal) -> rust_decimal::Decimal {
        match self.normal_balance {
            Some(NormalBalance::Credit) => -debit_minus_credit,
            _ => debit_minus_credit,
        }
    }
}

/// Checks the account number format: 1..=20 ASCII digits or uppercase letters
pub fn validate_account_number(number: &str) -> Result<(), AccountingError> {
    let valid = !number.is_empty()
        && number.len() <= MAX_ACCOUNT_NUMBER_LEN
        && number
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
    if valid {
        Ok(())
    } else {
        Err(AccountingError::InvalidAccountNumber(number.to_string()))
    }
}

/// Input for creating an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub number: String,
    pub name: String,
    pub account_type: AccountType,
    /// Defaults from `account_type` when absent
    pub normal_balance: Option<NormalBalance>,
    pub description: Option<String>,
}

impl NewAccount {
    pub fn new(number: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            number: number.into(),
            name: name.into(),
            account_type,
            normal_balance: None,
            description: None,
        }
    }

    pub fn with_normal_balance(mut self, normal_balance: NormalBalance) -> Self {
        self.normal_balance = Some(normal_balance);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates and turns the input into an account
    pub fn into_account(self) -> Result<Account, AccountingError> {
        validate_account_number(&self.number)?;
        if self.name.trim().is_empty() {
            return Err(AccountingError::Validation("Account name must not be empty".into()));
        }

        let normal_balance = self
            .normal_balance
            .or_else(|| self.account_type.default_normal_balance());

        let mut account = Account::new(self.number, self.name.trim(), self.account_type)
            .with_normal_balance(normal_balance);
        account.description = self.description;
        Ok(account)
    }
}

/// Editable account attributes; the number is never editable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub account_type: Option<AccountType>,
    pub normal_balance: Option<Option<NormalBalance>>,
    pub description: Option<Option<String>>,
}

impl AccountUpdate {
    /// Applies the changes to an account
    pub fn apply_to(self, account: &mut Account) -> Result<(), AccountingError> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(AccountingError::Validation("Account name must not be empty".into()));
            }
            account.name = name.trim().to_string();
        }
        if let Some(account_type) = self.account_type {
            account.account_type = account_type;
            if self.normal_balance.is_none() {
                account.normal_balance = account_type.default_normal_balance();
            }
        }
        if let Some(normal_balance) = self.normal_balance {
            account.normal_balance = normal_balance;
        }
        if let Some(description) = self.description {
            account.description = description;
        }
        account.updated_at = Utc::now();
        Ok(())
    }
}

/// Filter for listing accounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub active: Option<bool>,
}

impl AccountFilter {
    pub fn active() -> Self {
        Self {
            account_type: None,
            active: Some(true),
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        self.account_type.map_or(true, |t| account.account_type == t)
            && self.active.map_or(true, |a| account.is_active == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_balance_defaults_from_type() {
        assert_eq!(Account::new("512000", "Banque", AccountType::Asset).normal_balance, Some(NormalBalance::Debit));
        assert_eq!(Account::new("401000", "Fournisseurs", AccountType::Liability).normal_balance, Some(NormalBalance::Credit));
        assert_eq!(Account::new("471000", "Attente", AccountType::Other).normal_balance, None);
    }

    #[test]
    fn test_account_number_format() {
        assert!(validate_account_number("411000").is_ok());
        assert!(validate_account_number("411CLI01").is_ok());
        assert!(validate_account_number("").is_err());
        assert!(validate_account_number("411 000").is_err());
        assert!(validate_account_number("411abc").is_err());
        assert!(validate_account_number(&"1".repeat(21)).is_err());
    }

    #[test]
    fn test_new_account_explicit_normal_balance_wins() {
        let account = NewAccount::new("281000", "Amortissements", AccountType::Asset)
            .with_normal_balance(NormalBalance::Credit)
            .into_account()
            .unwrap();
        assert_eq!(account.normal_balance, Some(NormalBalance::Credit));
    }

    #[test]
    fn test_signed_balance() {
        use rust_decimal_macros::dec;
        let revenue = Account::new("707000", "Ventes", AccountType::Revenue);
        assert_eq!(revenue.signed_balance(dec!(-1000)), dec!(1000));
        let bank = Account::new("512000", "Banque", AccountType::Asset);
        assert_eq!(bank.signed_balance(dec!(250)), dec!(250));
    }

    #[test]
    fn test_update_changes_type_and_default_side() {
        let mut account = Account::new("471000", "Attente", AccountType::Other);
        AccountUpdate {
            account_type: Some(AccountType::Liability),
            ..Default::default()
        }
        .apply_to(&mut account)
        .unwrap();
        assert_eq!(account.normal_balance, Some(NormalBalance::Credit));
    }

    #[test]
    fn test_filter() {
        let mut account = Account::new("530000", "Caisse", AccountType::Asset);
        assert!(AccountFilter::active().matches(&account));
        account.is_active = false;
        assert!(!AccountFilter::active().matches(&account));
        assert!(AccountFilter::default().matches(&account));
    }
}
