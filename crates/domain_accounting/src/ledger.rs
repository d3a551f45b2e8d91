//! Double-entry ledger
//!
//! The [`Ledger`] is the only writer of journal entries. It enforces the
//! accounting invariants on every append and models corrections as reversing
//! entries; there is no update or delete API for posted entries.
//!
//! # Invariants
//!
//! - Every entry has at least two lines
//! - Every line is either a debit or a credit, strictly positive
//! - `|Σdebit − Σcredit| < 0.001`
//! - Lines reference existing, active accounts
//! - An entry is reversed at most once; reversals are not reversible

use chrono::NaiveDate;
use std::sync::Arc;

use core_kernel::{DocumentKind, JournalEntryId, SequenceGenerator};

use crate::error::AccountingError;
use crate::journal::{
    DocumentRef, JournalEntry, LedgerLine, LedgerLineFilter, NewJournalEntry, Page, TransactionType,
};
use crate::ports::{AccountPort, LedgerPort};

/// Journal service
#[derive(Clone)]
pub struct Ledger {
    accounts: Arc<dyn AccountPort>,
    store: Arc<dyn LedgerPort>,
    sequences: SequenceGenerator,
}

impl Ledger {
    pub fn new(accounts: Arc<dyn AccountPort>, store: Arc<dyn LedgerPort>, sequences: SequenceGenerator) -> Self {
        Self {
            accounts,
            store,
            sequences,
        }
    }

    /// Validates and appends an entry
    ///
    /// The entry number is minted when absent. An entry carrying an
    /// idempotency key that was already used returns the stored entry
    /// without writing.
    ///
    /// # Errors
    ///
    /// - `TooFewLines`, `InvalidLine`, `UnbalancedEntry` for invariant violations
    /// - `AccountNotFound` / `AccountInactive` for unusable accounts
    /// - `Sequence` when no number can be issued
    #[tracing::instrument(
        skip(self, entry),
        fields(transaction_type = %entry.transaction_type, related = ?entry.related)
    )]
    pub async fn append(&self, mut entry: NewJournalEntry) -> Result<JournalEntry, AccountingError> {
        entry.validate()?;

        if let Some(key) = &entry.idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                tracing::debug!(entry_number = %existing.number, "Idempotent append, entry already posted");
                return Ok(existing);
            }
        }

        for line in &mut entry.lines {
            let account = self
                .accounts
                .get_account(line.account_id)
                .await?
                .ok_or_else(|| AccountingError::AccountNotFound(line.account_number.clone()))?;
            // reversals may still hit accounts deactivated since the original posting
            if !account.is_active && entry.reverses.is_none() {
                return Err(AccountingError::AccountInactive(account.number));
            }
            line.account_number = account.number;
            line.account_name = account.name;
        }

        let number = match entry.number.take() {
            Some(number) => number,
            None => self.sequences.next_for(DocumentKind::JournalEntry, entry.date).await?,
        };
        let idempotency_key = entry.idempotency_key.clone();
        let posted = entry.into_entry(number);

        if let Err(e) = self.store.insert_entry(&posted).await {
            if e.is_conflict() {
                if let Some(key) = &idempotency_key {
                    if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                        return Ok(existing);
                    }
                }
                if let Some(original) = posted.reverses {
                    return Err(AccountingError::AlreadyReversed(original.to_string()));
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            entry_number = %posted.number,
            debit = %posted.total_debit(),
            lines = posted.lines.len(),
            "Journal entry posted"
        );
        Ok(posted)
    }

    pub async fn get(&self, id: JournalEntryId) -> Result<JournalEntry, AccountingError> {
        self.store
            .get_entry(id)
            .await?
            .ok_or_else(|| AccountingError::EntryNotFound(id.to_string()))
    }

    /// Entries posted for a document, oldest first
    pub async fn entries_for(&self, document: DocumentRef) -> Result<Vec<JournalEntry>, AccountingError> {
        Ok(self.store.entries_for_document(document).await?)
    }

    /// Appends the mirror of an entry
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` for an unknown id
    /// - `ReversalNotReversible` when the entry is itself a reversal
    /// - `AlreadyReversed` when it was reversed before
    #[tracing::instrument(skip(self))]
    pub async fn reverse(
        &self,
        entry_id: JournalEntryId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<JournalEntry, AccountingError> {
        let original = self.get(entry_id).await?;
        self.reverse_entry(&original, reason, date, None).await
    }

    async fn reverse_entry(
        &self,
        original: &JournalEntry,
        reason: &str,
        date: NaiveDate,
        idempotency_key: Option<String>,
    ) -> Result<JournalEntry, AccountingError> {
        if original.is_reversal() {
            return Err(AccountingError::ReversalNotReversible(original.number.clone()));
        }
        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                return Ok(existing);
            }
        }
        if original.is_reversed() {
            return Err(AccountingError::AlreadyReversed(original.number.clone()));
        }

        let mut reversal = NewJournalEntry::reversal_of(original, reason, date);
        reversal.idempotency_key = idempotency_key;
        self.append(reversal).await
    }

    /// Reverses the entry that was appended with `key`
    ///
    /// Safe to repeat: a second call returns the reversal written by the first.
    ///
    /// # Errors
    ///
    /// `EntryNotFound` while no entry carries the key
    #[tracing::instrument(skip(self))]
    pub async fn reverse_by_key(
        &self,
        key: &str,
        reason: &str,
        date: NaiveDate,
    ) -> Result<JournalEntry, AccountingError> {
        let original = self
            .store
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AccountingError::EntryNotFound(key.to_string()))?;
        let reversal_key = format!("reversal:{}", original.id);
        self.reverse_entry(&original, reason, date, Some(reversal_key)).await
    }

    /// Reverses every not-yet-reversed entry of `transaction_type` posted for a document
    ///
    /// Returns the reversals appended by this call. Re-running after a partial
    /// failure only reverses what is left.
    #[tracing::instrument(skip(self))]
    pub async fn reverse_related(
        &self,
        document: DocumentRef,
        transaction_type: TransactionType,
        reason: &str,
        date: NaiveDate,
    ) -> Result<Vec<JournalEntry>, AccountingError> {
        let entries = self.store.entries_for_document(document).await?;
        let mut reversals = Vec::new();
        for entry in entries
            .iter()
            .filter(|e| e.transaction_type == transaction_type && !e.is_reversed() && !e.is_reversal())
        {
            let key = format!("reversal:{}", entry.id);
            reversals.push(self.reverse_entry(entry, reason, date, Some(key)).await?);
        }
        if reversals.is_empty() {
            tracing::debug!("No entries left to reverse");
        }
        Ok(reversals)
    }

    /// Lines matching the filter, ordered by (date, entry number)
    pub async fn query_lines(
        &self,
        filter: &LedgerLineFilter,
        page: Option<Page>,
    ) -> Result<Vec<LedgerLine>, AccountingError> {
        Ok(self.store.query_lines(filter, page).await?)
    }

    /// Counts lines with the same predicates as [`query_lines`](Self::query_lines)
    pub async fn count_lines(&self, filter: &LedgerLineFilter) -> Result<u64, AccountingError> {
        Ok(self.store.count_lines(filter).await?)
    }
}
