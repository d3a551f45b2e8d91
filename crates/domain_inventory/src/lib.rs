//! Inventory Domain - Stock Ledger
//!
//! Tracks the available quantity of each physical product. Delivery notes
//! decrement stock when goods leave and restore it when they come back;
//! every movement is recorded with an idempotency key so retried workflows
//! never move stock twice.

pub mod stock;
pub mod ledger;
pub mod ports;
pub mod error;

pub use stock::{MovementReason, StockChange, StockItem, StockMovement, StockRequest};
pub use ledger::{NegativeStockPolicy, StockLedger};
pub use ports::{DeltaOutcome, StockPort};
pub use error::InventoryError;
