//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the ledger, the stock and the commercial
//! documents, built on SQLx.
//!
//! # Architecture
//!
//! Each adapter implements one or more domain ports and owns a clone of the
//! shared pool. Every multi-row write (a journal entry with its lines, a stock
//! movement with its counter update, a document change set with its outbox
//! messages) runs in a single transaction.
//!
//! The journal is append-only in storage as well: triggers installed by the
//! migrations reject updates and deletes on posted entries, except for
//! setting `reversed_by` once.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresAccountingStore};
//!
//! let pool = create_pool(&DatabaseConfig::new("postgres://localhost/gestion")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresAccountingStore::new(pool.clone());
//! ```

pub mod pool;
pub mod error;
pub mod adapters;

pub use pool::{check_connection, create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PostgresAccountingStore, PostgresDocumentStore, PostgresSequenceStore, PostgresStockStore};
