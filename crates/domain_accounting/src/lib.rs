//! Accounting Domain - French Double-Entry Ledger
//!
//! This crate implements the accounting side of the commercial ledger:
//! the chart of accounts, the append-only journal, the translation of
//! commercial events into entries, and the reports folded from the journal.
//!
//! # Double-Entry Accounting Principles
//!
//! Every journal entry creates balanced debits and credits:
//! - Debits increase asset/expense accounts
//! - Credits increase liability/equity/revenue accounts
//! - The sum of all debits must equal the sum of all credits
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_accounting::{AccountingService, SaleEvent};
//!
//! // Invoice FAC24000001: 1000 HT + 200 TVA
//! let entry = accounting.record_sale(&sale).await?;
//! assert_eq!(entry.lines.len(), 3); // 411000 D 1200 / 707000 C 1000 / 445710 C 200
//! ```

pub mod account;
pub mod chart;
pub mod journal;
pub mod ledger;
pub mod posting;
pub mod reporting;
pub mod ports;
pub mod error;

pub use account::{Account, AccountFilter, AccountType, AccountUpdate, NewAccount, NormalBalance};
pub use chart::{standard_french_chart, ChartOfAccounts};
pub use journal::{
    AccountSummary, AccountTotals, DocumentRef, DocumentType, JournalEntry, JournalLine, LedgerLine,
    LedgerLineFilter, NewJournalEntry, NewJournalLine, Page, TransactionType,
};
pub use ledger::Ledger;
pub use posting::{
    AccountingService, ManualJournalEntryCommand, ManualLine, PaymentEvent, PostingAccounts,
    PurchaseEvent, SaleEvent, SettlementChannel,
};
pub use reporting::{
    AccountSelector, AccountStatement, BalanceSheet, BalanceSheetRow, EquationCheck,
    GeneralLedgerQuery, GeneralLedgerReport, ReportingEngine, TrialBalance,
};
pub use ports::{AccountPort, LedgerPort};
pub use error::AccountingError;
