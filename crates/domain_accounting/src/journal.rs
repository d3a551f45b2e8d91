//! Journal entry and line types
//!
//! An entry is one balanced transaction made of at least two lines. Each line
//! moves exactly one side: its debit or its credit is strictly positive, the
//! other is zero. Posted entries are immutable; corrections are appended as
//! reversing entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use core_kernel::{AccountId, JournalEntryId, JournalLineId, UserId};

use crate::account::{Account, AccountType};
use crate::error::AccountingError;

/// Maximum accepted `|Σdebit − Σcredit|` (exclusive)
pub const BALANCE_TOLERANCE: Decimal = dec!(0.001);

/// Business event an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Sale,
    Purchase,
    PaymentReceived,
    PaymentMade,
    ManualJournal,
    StockAdjustment,
    Reversal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "SALE",
            TransactionType::Purchase => "PURCHASE",
            TransactionType::PaymentReceived => "PAYMENT_RECEIVED",
            TransactionType::PaymentMade => "PAYMENT_MADE",
            TransactionType::ManualJournal => "MANUAL_JOURNAL",
            TransactionType::StockAdjustment => "STOCK_ADJUSTMENT",
            TransactionType::Reversal => "REVERSAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            TransactionType::Sale,
            TransactionType::Purchase,
            TransactionType::PaymentReceived,
            TransactionType::PaymentMade,
            TransactionType::ManualJournal,
            TransactionType::StockAdjustment,
            TransactionType::Reversal,
        ]
        .into_iter()
        .find(|t| t.as_str() == value)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of commercial document an entry points back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Quote,
    Invoice,
    DeliveryNote,
    Purchase,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quote => "QUOTE",
            DocumentType::Invoice => "INVOICE",
            DocumentType::DeliveryNote => "DELIVERY_NOTE",
            DocumentType::Purchase => "PURCHASE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "QUOTE" => Some(DocumentType::Quote),
            "INVOICE" => Some(DocumentType::Invoice),
            "DELIVERY_NOTE" => Some(DocumentType::DeliveryNote),
            "PURCHASE" => Some(DocumentType::Purchase),
            _ => None,
        }
    }
}

/// Back-reference from an entry to the document that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_type: DocumentType,
    pub document_id: Uuid,
}

impl DocumentRef {
    pub fn new(document_type: DocumentType, document_id: impl Into<Uuid>) -> Self {
        Self {
            document_type,
            document_id: document_id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_type.as_str(), self.document_id)
    }
}

/// A posted journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    /// Order within the entry, starting at 1
    pub position: u32,
    pub account_id: AccountId,
    /// Account number at posting time
    pub account_number: String,
    /// Account name at posting time
    pub account_name: String,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl JournalLine {
    /// `debit − credit`
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A posted, immutable journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    /// Sequencer-issued number, unique
    pub number: String,
    pub date: NaiveDate,
    pub description: String,
    pub transaction_type: TransactionType,
    pub related: Option<DocumentRef>,
    pub lines: Vec<JournalLine>,
    /// Entry this one reverses
    pub reverses: Option<JournalEntryId>,
    /// Entry that reversed this one
    pub reversed_by: Option<JournalEntryId>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed_by.is_some()
    }
}

/// A line waiting to be posted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalLine {
    pub account_id: AccountId,
    pub account_number: String,
    pub account_name: String,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl NewJournalLine {
    pub fn debit(account: &Account, amount: Decimal) -> Self {
        Self::for_account(account, amount, Decimal::ZERO)
    }

    pub fn credit(account: &Account, amount: Decimal) -> Self {
        Self::for_account(account, Decimal::ZERO, amount)
    }

    fn for_account(account: &Account, debit: Decimal, credit: Decimal) -> Self {
        Self {
            account_id: account.id,
            account_number: account.number.clone(),
            account_name: account.name.clone(),
            description: None,
            debit,
            credit,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An entry ready to be appended to the ledger
///
/// Lines already carry resolved account ids, so the value can be queued
/// (e.g. in an outbox) and appended later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    /// Pre-assigned number; the ledger mints one when absent
    pub number: Option<String>,
    pub date: NaiveDate,
    pub description: String,
    pub transaction_type: TransactionType,
    pub related: Option<DocumentRef>,
    pub lines: Vec<NewJournalLine>,
    pub reverses: Option<JournalEntryId>,
    /// Appending twice with the same key yields the first entry
    pub idempotency_key: Option<String>,
    pub created_by: Option<UserId>,
}

impl NewJournalEntry {
    pub fn new(date: NaiveDate, description: impl Into<String>, transaction_type: TransactionType) -> Self {
        Self {
            number: None,
            date,
            description: description.into(),
            transaction_type,
            related: None,
            lines: Vec::new(),
            reverses: None,
            idempotency_key: None,
            created_by: None,
        }
    }

    pub fn with_related(mut self, related: DocumentRef) -> Self {
        self.related = Some(related);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    /// Adds a debit line
    pub fn debit(mut self, account: &Account, amount: Decimal, description: impl Into<String>) -> Self {
        self.lines
            .push(NewJournalLine::debit(account, amount).with_description(description));
        self
    }

    /// Adds a credit line
    pub fn credit(mut self, account: &Account, amount: Decimal, description: impl Into<String>) -> Self {
        self.lines
            .push(NewJournalLine::credit(account, amount).with_description(description));
        self
    }

    pub fn push_line(&mut self, line: NewJournalLine) {
        self.lines.push(line);
    }

    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Checks the double-entry invariants
    ///
    /// # Errors
    ///
    /// - `TooFewLines` with fewer than 2 lines
    /// - `InvalidLine` when a line has a negative side, both sides, or neither
    /// - `UnbalancedEntry` when `|Σdebit − Σcredit| ≥ 0.001`
    pub fn validate(&self) -> Result<(), AccountingError> {
        if self.description.trim().is_empty() {
            return Err(AccountingError::Validation("Entry description must not be empty".into()));
        }
        if self.lines.len() < 2 {
            return Err(AccountingError::TooFewLines(self.lines.len()));
        }

        for (index, line) in self.lines.iter().enumerate() {
            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                return Err(AccountingError::InvalidLine {
                    index,
                    reason: "amounts must not be negative".into(),
                });
            }
            let debit = line.debit > Decimal::ZERO;
            let credit = line.credit > Decimal::ZERO;
            if debit == credit {
                return Err(AccountingError::InvalidLine {
                    index,
                    reason: if debit {
                        "line has both a debit and a credit".into()
                    } else {
                        "line moves nothing".into()
                    },
                });
            }
        }

        let debits = self.total_debit();
        let credits = self.total_credit();
        if (debits - credits).abs() >= BALANCE_TOLERANCE {
            return Err(AccountingError::UnbalancedEntry { debits, credits });
        }
        Ok(())
    }

    /// Mirror entry swapping every debit and credit of `original`
    pub fn reversal_of(original: &JournalEntry, reason: &str, date: NaiveDate) -> Self {
        let lines = original
            .lines
            .iter()
            .map(|l| NewJournalLine {
                account_id: l.account_id,
                account_number: l.account_number.clone(),
                account_name: l.account_name.clone(),
                description: Some(format!("Reversal: {}", reason)),
                debit: l.credit,
                credit: l.debit,
            })
            .collect();

        Self {
            number: None,
            date,
            description: format!("Reversal of {}: {}", original.number, reason),
            transaction_type: TransactionType::Reversal,
            related: original.related,
            lines,
            reverses: Some(original.id),
            idempotency_key: None,
            created_by: None,
        }
    }

    /// Turns the draft into a posted entry
    pub fn into_entry(self, number: String) -> JournalEntry {
        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(i, l)| JournalLine {
                id: JournalLineId::new(),
                position: i as u32 + 1,
                account_id: l.account_id,
                account_number: l.account_number,
                account_name: l.account_name,
                description: l.description,
                debit: l.debit,
                credit: l.credit,
            })
            .collect();

        JournalEntry {
            id: JournalEntryId::new(),
            number,
            date: self.date,
            description: self.description,
            transaction_type: self.transaction_type,
            related: self.related,
            lines,
            reverses: self.reverses,
            reversed_by: None,
            idempotency_key: self.idempotency_key,
            created_by: self.created_by,
            created_at: Utc::now(),
        }
    }
}

/// Current account attributes joined onto a ledger line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub number: String,
    pub name: String,
    pub account_type: AccountType,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            number: account.number.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
        }
    }
}

/// One line of the general ledger: entry metadata, the line and its account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub entry_id: JournalEntryId,
    pub entry_number: String,
    pub date: NaiveDate,
    pub entry_description: String,
    pub transaction_type: TransactionType,
    pub related: Option<DocumentRef>,
    pub line: JournalLine,
    pub account: AccountSummary,
}

/// Predicates over ledger lines
///
/// A single value feeds both the page query and the count query, so every
/// predicate is applied exactly once by either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLineFilter {
    /// Inclusive lower bound on the entry date
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date
    pub date_to: Option<NaiveDate>,
    pub account_id: Option<AccountId>,
    pub transaction_type: Option<TransactionType>,
}

impl LedgerLineFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_date(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    pub fn to_date(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    pub fn for_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn of_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Lines dated on or before `date`
    pub fn as_of(date: NaiveDate) -> Self {
        Self::new().to_date(date)
    }

    pub fn matches(&self, entry: &JournalEntry, line: &JournalLine) -> bool {
        self.date_from.map_or(true, |d| entry.date >= d)
            && self.date_to.map_or(true, |d| entry.date <= d)
            && self.account_id.map_or(true, |a| line.account_id == a)
            && self.transaction_type.map_or(true, |t| entry.transaction_type == t)
    }
}

/// Offset/limit window over ordered lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Debit and credit sums of one account over a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub account_id: AccountId,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl AccountTotals {
    pub fn zero(account_id: AccountId) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
        }
    }

    /// `debit − credit`
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn accounts() -> (Account, Account, Account) {
        (
            Account::new("411000", "Clients", AccountType::Asset),
            Account::new("707000", "Ventes de marchandises", AccountType::Revenue),
            Account::new("445710", "TVA collectée", AccountType::Liability),
        )
    }

    #[test]
    fn test_balanced_entry_validates() {
        let (receivable, revenue, vat) = accounts();
        let entry = NewJournalEntry::new(date(), "Sale", TransactionType::Sale)
            .debit(&receivable, dec!(1200), "TTC")
            .credit(&revenue, dec!(1000), "HT")
            .credit(&vat, dec!(200), "TVA");
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_single_line_is_rejected() {
        let (receivable, _, _) = accounts();
        let entry = NewJournalEntry::new(date(), "Half", TransactionType::ManualJournal)
            .debit(&receivable, dec!(10), "only");
        assert!(matches!(entry.validate(), Err(AccountingError::TooFewLines(1))));
    }

    #[test]
    fn test_line_with_both_sides_is_rejected() {
        let (receivable, revenue, _) = accounts();
        let mut entry = NewJournalEntry::new(date(), "Both", TransactionType::ManualJournal)
            .debit(&receivable, dec!(10), "a")
            .credit(&revenue, dec!(10), "b");
        entry.lines[0].credit = dec!(5);
        entry.lines[1].credit = dec!(15);
        assert!(matches!(
            entry.validate(),
            Err(AccountingError::InvalidLine { index: 0, .. })
        ));
    }

    #[test]
    fn test_zero_line_is_rejected() {
        let (receivable, revenue, vat) = accounts();
        let entry = NewJournalEntry::new(date(), "Zero", TransactionType::Sale)
            .debit(&receivable, dec!(100), "a")
            .credit(&revenue, dec!(100), "b")
            .credit(&vat, dec!(0), "c");
        assert!(matches!(
            entry.validate(),
            Err(AccountingError::InvalidLine { index: 2, .. })
        ));
    }

    #[test]
    fn test_tolerance_boundary() {
        let (receivable, revenue, _) = accounts();
        let within = NewJournalEntry::new(date(), "Near", TransactionType::ManualJournal)
            .debit(&receivable, dec!(100.0009), "a")
            .credit(&revenue, dec!(100), "b");
        assert!(within.validate().is_ok());

        let outside = NewJournalEntry::new(date(), "Off", TransactionType::ManualJournal)
            .debit(&receivable, dec!(100.001), "a")
            .credit(&revenue, dec!(100), "b");
        assert!(matches!(outside.validate(), Err(AccountingError::UnbalancedEntry { .. })));
    }

    #[test]
    fn test_reversal_swaps_sides() {
        let (receivable, revenue, vat) = accounts();
        let posted = NewJournalEntry::new(date(), "Sale", TransactionType::Sale)
            .debit(&receivable, dec!(1200), "TTC")
            .credit(&revenue, dec!(1000), "HT")
            .credit(&vat, dec!(200), "TVA")
            .into_entry("EJ24000001".into());

        let reversal = NewJournalEntry::reversal_of(&posted, "cancelled", date());
        assert_eq!(reversal.transaction_type, TransactionType::Reversal);
        assert_eq!(reversal.reverses, Some(posted.id));
        assert_eq!(reversal.lines[0].credit, dec!(1200));
        assert_eq!(reversal.lines[1].debit, dec!(1000));
        assert!(reversal.validate().is_ok());
    }

    #[test]
    fn test_filter_bounds_are_inclusive() {
        let (receivable, revenue, _) = accounts();
        let posted = NewJournalEntry::new(date(), "Sale", TransactionType::Sale)
            .debit(&receivable, dec!(10), "a")
            .credit(&revenue, dec!(10), "b")
            .into_entry("EJ24000002".into());

        let filter = LedgerLineFilter::new().from_date(date()).to_date(date());
        assert!(filter.matches(&posted, &posted.lines[0]));

        let other_account = LedgerLineFilter::new().for_account(revenue.id);
        assert!(!other_account.matches(&posted, &posted.lines[0]));
        assert!(other_account.matches(&posted, &posted.lines[1]));
    }

    #[test]
    fn test_transaction_type_names() {
        assert_eq!(TransactionType::PaymentReceived.as_str(), "PAYMENT_RECEIVED");
        assert_eq!(TransactionType::parse("REVERSAL"), Some(TransactionType::Reversal));
        assert_eq!(
            serde_json::to_string(&TransactionType::StockAdjustment).unwrap(),
            "\"STOCK_ADJUSTMENT\""
        );
    }
}
