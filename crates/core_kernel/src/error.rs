//! Core error types used across the system

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::AccessDenied;
use crate::money::MoneyError;
use crate::ports::PortError;

/// Coarse classification shared by every domain error
///
/// Callers (binaries, API adapters) map on this instead of matching each
/// crate's error enum. `Concurrency` and `Infrastructure` errors are worth
/// retrying with a fresh read; the others are final for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected input or illegal transition; nothing was written
    Validation,
    /// A referenced entity does not exist
    NotFound,
    /// Lost update or duplicate key
    Concurrency,
    /// The actor lacks the required permission
    Forbidden,
    /// Storage or external collaborator failure
    Infrastructure,
}

impl ErrorKind {
    /// Returns true if the caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Concurrency | ErrorKind::Infrastructure)
    }
}

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidStateTransition(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Money(_)
            | CoreError::Validation(_)
            | CoreError::InvalidStateTransition(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::Configuration(_) => ErrorKind::Infrastructure,
            CoreError::Port(e) => e.kind(),
        }
    }
}
