//! Commerce domain errors

use thiserror::Error;
use validator::ValidationErrors;

use core_kernel::{AccessDenied, ErrorKind, MoneyError, PortError, SequenceError};
use domain_accounting::AccountingError;
use domain_inventory::InventoryError;

/// Errors that can occur in the commerce domain
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("Quote not found: {0}")]
    QuoteNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Delivery note not found: {0}")]
    DeliveryNoteNotFound(String),

    /// The document's state machine has no such edge
    #[error("Invalid {document} transition from {from} to {to}")]
    InvalidTransition {
        document: &'static str,
        from: String,
        to: String,
    },

    /// A document can be converted only once
    #[error("Document {0} has already been converted")]
    AlreadyConverted(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Numbering failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Accounting: {0}")]
    Accounting(#[from] AccountingError),

    #[error("Inventory: {0}")]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl CommerceError {
    pub fn validation(message: impl Into<String>) -> Self {
        CommerceError::Validation(message.into())
    }

    pub(crate) fn transition(document: &'static str, from: impl ToString, to: impl ToString) -> Self {
        CommerceError::InvalidTransition {
            document,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Maps the error onto the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommerceError::QuoteNotFound(_)
            | CommerceError::InvoiceNotFound(_)
            | CommerceError::DeliveryNoteNotFound(_) => ErrorKind::NotFound,
            CommerceError::InvalidTransition { .. }
            | CommerceError::AlreadyConverted(_)
            | CommerceError::Validation(_)
            | CommerceError::Money(_) => ErrorKind::Validation,
            CommerceError::Forbidden(_) => ErrorKind::Forbidden,
            CommerceError::Sequence(SequenceError::Storage(e)) => e.kind(),
            CommerceError::Sequence(_) => ErrorKind::Validation,
            CommerceError::Accounting(e) => e.kind(),
            CommerceError::Inventory(e) => e.kind(),
            CommerceError::Port(e) => e.kind(),
        }
    }
}

impl From<ValidationErrors> for CommerceError {
    fn from(errors: ValidationErrors) -> Self {
        CommerceError::Validation(errors.to_string())
    }
}
