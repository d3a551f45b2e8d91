//! Accounting Domain Ports
//!
//! Storage interfaces for the chart of accounts and the journal. The
//! PostgreSQL adapters live in `infra_db`; the [`mock`] module provides an
//! in-memory store implementing both ports over shared state so ledger lines
//! can be joined with their accounts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_accounting::ports::{AccountPort, LedgerPort};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MockAccountingStore::new());
//! let ledger = Ledger::new(store.clone(), store.clone(), sequences);
//! ```

use async_trait::async_trait;

use core_kernel::{AccountId, DomainPort, JournalEntryId, PortError};

use crate::account::{Account, AccountFilter};
use crate::journal::{AccountTotals, DocumentRef, JournalEntry, LedgerLine, LedgerLineFilter, Page};

/// Persistence of the chart of accounts
#[async_trait]
pub trait AccountPort: DomainPort {
    /// Inserts an account
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` when the number is already taken
    async fn insert_account(&self, account: &Account) -> Result<(), PortError>;

    /// Replaces the stored account with the same id
    async fn update_account(&self, account: &Account) -> Result<(), PortError>;

    /// Removes an account
    async fn delete_account(&self, id: AccountId) -> Result<(), PortError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, PortError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<Account>, PortError>;

    /// Accounts matching the filter, ordered by number
    async fn list_accounts(&self, filter: &AccountFilter) -> Result<Vec<Account>, PortError>;
}

/// Append-only journal storage
#[async_trait]
pub trait LedgerPort: DomainPort {
    /// Stores an entry and its lines atomically
    ///
    /// When `entry.reverses` is set, the reversed entry is marked in the same
    /// write.
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` on a duplicate number or idempotency key, or when
    /// the reversed entry was already reversed
    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), PortError>;

    async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<JournalEntry>, PortError>;

    /// Entries posted for a document, oldest first
    async fn entries_for_document(&self, document: DocumentRef) -> Result<Vec<JournalEntry>, PortError>;

    /// Lines matching the filter ordered by (date, entry number, position)
    async fn query_lines(
        &self,
        filter: &LedgerLineFilter,
        page: Option<Page>,
    ) -> Result<Vec<LedgerLine>, PortError>;

    /// Number of lines matching the filter
    async fn count_lines(&self, filter: &LedgerLineFilter) -> Result<u64, PortError>;

    /// Debit/credit sums per account over the filter
    async fn account_totals(&self, filter: &LedgerLineFilter) -> Result<Vec<AccountTotals>, PortError>;

    /// True when at least one line references the account
    async fn account_has_lines(&self, account_id: AccountId) -> Result<bool, PortError>;
}

/// In-memory accounting store for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use crate::journal::AccountSummary;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct State {
        accounts: HashMap<AccountId, Account>,
        entries: Vec<JournalEntry>,
    }

    /// Implements [`AccountPort`] and [`LedgerPort`] over one shared state
    #[derive(Default, Clone)]
    pub struct MockAccountingStore {
        state: Arc<RwLock<State>>,
        ledger_unavailable: Arc<AtomicBool>,
    }

    impl MockAccountingStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a store pre-filled with accounts
        pub async fn with_accounts(accounts: Vec<Account>) -> Self {
            let store = Self::new();
            {
                let mut state = store.state.write().await;
                for account in accounts {
                    state.accounts.insert(account.id, account);
                }
            }
            store
        }

        /// Makes journal writes fail with `ServiceUnavailable`
        pub fn set_ledger_unavailable(&self, unavailable: bool) {
            self.ledger_unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// All posted entries in insertion order
        pub async fn entries(&self) -> Vec<JournalEntry> {
            self.state.read().await.entries.clone()
        }

        fn check_ledger(&self) -> Result<(), PortError> {
            if self.ledger_unavailable.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("ledger store"));
            }
            Ok(())
        }
    }

    impl DomainPort for MockAccountingStore {}

    #[async_trait]
    impl AccountPort for MockAccountingStore {
        async fn insert_account(&self, account: &Account) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if state.accounts.values().any(|a| a.number == account.number) {
                return Err(PortError::conflict(format!(
                    "account number {} already exists",
                    account.number
                )));
            }
            state.accounts.insert(account.id, account.clone());
            Ok(())
        }

        async fn update_account(&self, account: &Account) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            match state.accounts.get_mut(&account.id) {
                Some(stored) => {
                    *stored = account.clone();
                    Ok(())
                }
                None => Err(PortError::not_found("Account", account.id)),
            }
        }

        async fn delete_account(&self, id: AccountId) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let referenced = state
                .entries
                .iter()
                .flat_map(|e| e.lines.iter())
                .any(|l| l.account_id == id);
            if referenced {
                return Err(PortError::conflict(format!("account {} is referenced", id)));
            }
            state
                .accounts
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| PortError::not_found("Account", id))
        }

        async fn get_account(&self, id: AccountId) -> Result<Option<Account>, PortError> {
            Ok(self.state.read().await.accounts.get(&id).cloned())
        }

        async fn find_by_number(&self, number: &str) -> Result<Option<Account>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .accounts
                .values()
                .find(|a| a.number == number)
                .cloned())
        }

        async fn list_accounts(&self, filter: &AccountFilter) -> Result<Vec<Account>, PortError> {
            let state = self.state.read().await;
            let mut accounts: Vec<Account> = state
                .accounts
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect();
            accounts.sort_by(|a, b| a.number.cmp(&b.number));
            Ok(accounts)
        }
    }

    #[async_trait]
    impl LedgerPort for MockAccountingStore {
        async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), PortError> {
            self.check_ledger()?;
            let mut state = self.state.write().await;

            if state.entries.iter().any(|e| e.number == entry.number) {
                return Err(PortError::conflict(format!("entry number {} exists", entry.number)));
            }
            if let Some(key) = &entry.idempotency_key {
                if state.entries.iter().any(|e| e.idempotency_key.as_ref() == Some(key)) {
                    return Err(PortError::conflict(format!("idempotency key {} exists", key)));
                }
            }
            if let Some(original_id) = entry.reverses {
                let original = state
                    .entries
                    .iter_mut()
                    .find(|e| e.id == original_id)
                    .ok_or_else(|| PortError::not_found("JournalEntry", original_id))?;
                if original.reversed_by.is_some() {
                    return Err(PortError::conflict(format!("entry {} already reversed", original_id)));
                }
                original.reversed_by = Some(entry.id);
            }

            state.entries.push(entry.clone());
            Ok(())
        }

        async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
            Ok(self.state.read().await.entries.iter().find(|e| e.id == id).cloned())
        }

        async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<JournalEntry>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .entries
                .iter()
                .find(|e| e.idempotency_key.as_deref() == Some(key))
                .cloned())
        }

        async fn entries_for_document(&self, document: DocumentRef) -> Result<Vec<JournalEntry>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .entries
                .iter()
                .filter(|e| e.related == Some(document))
                .cloned()
                .collect())
        }

        async fn query_lines(
            &self,
            filter: &LedgerLineFilter,
            page: Option<Page>,
        ) -> Result<Vec<LedgerLine>, PortError> {
            let state = self.state.read().await;
            let mut rows = Vec::new();
            for entry in &state.entries {
                for line in entry.lines.iter().filter(|l| filter.matches(entry, l)) {
                    let account = state
                        .accounts
                        .get(&line.account_id)
                        .ok_or_else(|| PortError::not_found("Account", line.account_id))?;
                    rows.push(LedgerLine {
                        entry_id: entry.id,
                        entry_number: entry.number.clone(),
                        date: entry.date,
                        entry_description: entry.description.clone(),
                        transaction_type: entry.transaction_type,
                        related: entry.related,
                        line: line.clone(),
                        account: AccountSummary::from(account),
                    });
                }
            }

            rows.sort_by(|a, b| {
                (a.date, &a.entry_number, a.line.position).cmp(&(b.date, &b.entry_number, b.line.position))
            });

            Ok(match page {
                Some(page) => rows
                    .into_iter()
                    .skip(page.offset as usize)
                    .take(page.limit as usize)
                    .collect(),
                None => rows,
            })
        }

        async fn count_lines(&self, filter: &LedgerLineFilter) -> Result<u64, PortError> {
            let state = self.state.read().await;
            let count = state
                .entries
                .iter()
                .flat_map(|e| e.lines.iter().map(move |l| (e, l)))
                .filter(|(e, l)| filter.matches(e, l))
                .count();
            Ok(count as u64)
        }

        async fn account_totals(&self, filter: &LedgerLineFilter) -> Result<Vec<AccountTotals>, PortError> {
            let state = self.state.read().await;
            let mut totals: BTreeMap<AccountId, AccountTotals> = BTreeMap::new();
            for entry in &state.entries {
                for line in entry.lines.iter().filter(|l| filter.matches(entry, l)) {
                    let t = totals
                        .entry(line.account_id)
                        .or_insert_with(|| AccountTotals::zero(line.account_id));
                    t.debit += line.debit;
                    t.credit += line.credit;
                }
            }
            Ok(totals.into_values().collect())
        }

        async fn account_has_lines(&self, account_id: AccountId) -> Result<bool, PortError> {
            Ok(self
                .state
                .read()
                .await
                .entries
                .iter()
                .flat_map(|e| e.lines.iter())
                .any(|l| l.account_id == account_id))
        }
    }
}
