//! Inventory domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{ErrorKind, PortError};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Decrement would take stock below zero under the reject policy
    #[error("Insufficient stock for {reference}: available {available}, requested {requested}")]
    InsufficientStock {
        reference: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::ProductNotFound(_) => ErrorKind::NotFound,
            InventoryError::InsufficientStock { .. } | InventoryError::Validation(_) => {
                ErrorKind::Validation
            }
            InventoryError::Port(e) => e.kind(),
        }
    }
}
