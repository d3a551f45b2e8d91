//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter translates
//! between domain models and rows, and maps [`crate::DatabaseError`] onto
//! `PortError` at the boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresAccountingStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(PostgresAccountingStore::new(pool.clone()));
//! let chart = ChartOfAccounts::new(store.clone(), store.clone());
//! ```

pub mod sequence;
pub mod accounting;
pub mod inventory;
pub mod commerce;

pub use sequence::PostgresSequenceStore;
pub use accounting::PostgresAccountingStore;
pub use inventory::PostgresStockStore;
pub use commerce::PostgresDocumentStore;

use core_kernel::PortError;

use crate::error::DatabaseError;

/// Maps any database failure onto the port error taxonomy
pub(crate) fn db_to_port_error(error: impl Into<DatabaseError>) -> PortError {
    let error: DatabaseError = error.into();
    error.into()
}
