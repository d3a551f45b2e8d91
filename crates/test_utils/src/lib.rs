//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures, and helpers for the ledger test
//! suite. Depends on the domain crates with their `mock` feature, so it is
//! meant for integration tests (`tests/`) only.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common entities
//! - `builders`: Command builders and the in-memory [`TestHarness`]
//! - `assertions`: Custom assertion helpers for ledger types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
