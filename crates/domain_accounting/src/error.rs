//! Accounting domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{AccessDenied, ErrorKind, MoneyError, PortError, SequenceError};

/// Errors that can occur in the accounting domain
#[derive(Debug, Error)]
pub enum AccountingError {
    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account already exists
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    /// Account number is malformed
    #[error("Invalid account number: {0:?}")]
    InvalidAccountNumber(String),

    /// Account is deactivated and cannot receive new lines
    #[error("Account is inactive: {0}")]
    AccountInactive(String),

    /// Account is referenced by ledger lines and cannot be deleted
    #[error("Account is referenced by ledger lines: {0}")]
    AccountInUse(String),

    /// Journal entry not found
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    /// Entry is not balanced
    #[error("Unbalanced entry: debits={debits}, credits={credits}")]
    UnbalancedEntry {
        debits: Decimal,
        credits: Decimal,
    },

    /// Entry has fewer than two lines
    #[error("Entry must have at least 2 lines, got {0}")]
    TooFewLines(usize),

    /// A line is neither a pure debit nor a pure credit
    #[error("Invalid line {index}: {reason}")]
    InvalidLine {
        index: usize,
        reason: String,
    },

    /// Entry was already reversed
    #[error("Journal entry already reversed: {0}")]
    AlreadyReversed(String),

    /// Reversal entries cannot themselves be reversed
    #[error("Reversal entries cannot be reversed: {0}")]
    ReversalNotReversible(String),

    /// Generic validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Numbering failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl AccountingError {
    /// Maps the error onto the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountingError::AccountNotFound(_) | AccountingError::EntryNotFound(_) => {
                ErrorKind::NotFound
            }
            AccountingError::Forbidden(_) => ErrorKind::Forbidden,
            AccountingError::Sequence(SequenceError::Storage(e)) => e.kind(),
            AccountingError::Port(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}
