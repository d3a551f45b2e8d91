//! Chart of accounts
//!
//! Registry of valid accounts. Numbers are unique and immutable once created;
//! accounts are deactivated rather than deleted, and deletion is only allowed
//! while no ledger line references the account.

use std::sync::Arc;

use core_kernel::{AccountId, Actor, Permission};

use crate::account::{Account, AccountFilter, AccountType, AccountUpdate, NewAccount};
use crate::error::AccountingError;
use crate::ports::{AccountPort, LedgerPort};

/// The French Plan Comptable Général accounts the system relies on
///
/// Returned as creation inputs; [`ChartOfAccounts::seed_standard_chart`]
/// creates the missing ones.
pub fn standard_french_chart() -> Vec<NewAccount> {
    use AccountType::*;
    vec![
        NewAccount::new("101000", "Capital", Equity),
        NewAccount::new("120000", "Résultat de l'exercice", Equity),
        NewAccount::new("401000", "Fournisseurs", Liability),
        NewAccount::new("411000", "Clients", Asset),
        NewAccount::new("445660", "TVA déductible sur autres biens et services", Asset),
        NewAccount::new("445710", "TVA collectée", Liability),
        NewAccount::new("512000", "Banque", Asset),
        NewAccount::new("530000", "Caisse", Asset),
        NewAccount::new("607000", "Achats de marchandises", Expense),
        NewAccount::new("706000", "Prestations de services", Revenue),
        NewAccount::new("707000", "Ventes de marchandises", Revenue),
    ]
}

/// Application service over the account registry
#[derive(Clone)]
pub struct ChartOfAccounts {
    accounts: Arc<dyn AccountPort>,
    ledger: Arc<dyn LedgerPort>,
}

impl ChartOfAccounts {
    pub fn new(accounts: Arc<dyn AccountPort>, ledger: Arc<dyn LedgerPort>) -> Self {
        Self { accounts, ledger }
    }

    /// Creates an account
    ///
    /// # Errors
    ///
    /// - `Forbidden` without `ManageAccounts`
    /// - `InvalidAccountNumber` for a malformed number
    /// - `AccountAlreadyExists` when the number is taken
    #[tracing::instrument(skip(self, actor), fields(number = %input.number))]
    pub async fn create(&self, actor: &Actor, input: NewAccount) -> Result<Account, AccountingError> {
        actor.ensure(Permission::ManageAccounts)?;
        let account = input.into_account()?;

        if self.accounts.find_by_number(&account.number).await?.is_some() {
            return Err(AccountingError::AccountAlreadyExists(account.number));
        }
        self.accounts.insert_account(&account).await.map_err(|e| {
            if e.is_conflict() {
                AccountingError::AccountAlreadyExists(account.number.clone())
            } else {
                e.into()
            }
        })?;

        tracing::info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    pub async fn find_by_number(&self, number: &str) -> Result<Option<Account>, AccountingError> {
        Ok(self.accounts.find_by_number(number).await?)
    }

    pub async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, AccountingError> {
        Ok(self.accounts.get_account(id).await?)
    }

    /// Like [`find_by_number`](Self::find_by_number) but a missing account is an error
    pub async fn require_by_number(&self, number: &str) -> Result<Account, AccountingError> {
        self.find_by_number(number)
            .await?
            .ok_or_else(|| AccountingError::AccountNotFound(number.to_string()))
    }

    pub async fn require_by_id(&self, id: AccountId) -> Result<Account, AccountingError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AccountingError::AccountNotFound(id.to_string()))
    }

    pub async fn list(&self, filter: &AccountFilter) -> Result<Vec<Account>, AccountingError> {
        Ok(self.accounts.list_accounts(filter).await?)
    }

    /// Edits name, type, normal balance or description
    #[tracing::instrument(skip(self, actor, update))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Account, AccountingError> {
        actor.ensure(Permission::ManageAccounts)?;
        let mut account = self.require_by_id(id).await?;
        update.apply_to(&mut account)?;
        self.accounts.update_account(&account).await?;
        tracing::info!(number = %account.number, "Account updated");
        Ok(account)
    }

    /// Stops new entries from referencing the account
    #[tracing::instrument(skip(self, actor))]
    pub async fn deactivate(&self, actor: &Actor, id: AccountId) -> Result<Account, AccountingError> {
        self.set_active(actor, id, false).await
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn reactivate(&self, actor: &Actor, id: AccountId) -> Result<Account, AccountingError> {
        self.set_active(actor, id, true).await
    }

    async fn set_active(&self, actor: &Actor, id: AccountId, active: bool) -> Result<Account, AccountingError> {
        actor.ensure(Permission::ManageAccounts)?;
        let mut account = self.require_by_id(id).await?;
        if account.is_active != active {
            account.is_active = active;
            account.updated_at = chrono::Utc::now();
            self.accounts.update_account(&account).await?;
            tracing::info!(number = %account.number, active, "Account activation changed");
        }
        Ok(account)
    }

    /// Deletes an account no ledger line references
    ///
    /// # Errors
    ///
    /// `AccountInUse` when lines reference it; deactivate instead
    #[tracing::instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: AccountId) -> Result<(), AccountingError> {
        actor.ensure(Permission::ManageAccounts)?;
        let account = self.require_by_id(id).await?;
        if self.ledger.account_has_lines(id).await? {
            return Err(AccountingError::AccountInUse(account.number));
        }
        self.accounts.delete_account(id).await.map_err(|e| {
            if e.is_conflict() {
                AccountingError::AccountInUse(account.number.clone())
            } else {
                e.into()
            }
        })?;
        tracing::info!(number = %account.number, "Account deleted");
        Ok(())
    }

    /// Creates the standard accounts that do not exist yet
    ///
    /// Returns the accounts created by this call.
    #[tracing::instrument(skip(self, actor))]
    pub async fn seed_standard_chart(&self, actor: &Actor) -> Result<Vec<Account>, AccountingError> {
        actor.ensure(Permission::ManageAccounts)?;
        let mut created = Vec::new();
        for input in standard_french_chart() {
            if self.accounts.find_by_number(&input.number).await?.is_some() {
                continue;
            }
            match self.create(actor, input).await {
                Ok(account) => created.push(account),
                Err(AccountingError::AccountAlreadyExists(number)) => {
                    tracing::debug!(%number, "Account created concurrently, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(created = created.len(), "Standard chart seeded");
        Ok(created)
    }
}
