//! Core Kernel - Foundational types shared by the commercial ledger
//!
//! This crate provides the building blocks used across all domain crates:
//! - Money and percentage types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - The port error type and marker trait for hexagonal adapters
//! - The atomic document-number sequencer
//! - The notification port (fire-and-forget domain notifications)
//! - Roles and permissions checked by gated operations
//! - The business calendar (dates are reckoned in Europe/Paris)

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;
pub mod sequence;
pub mod notification;
pub mod access;
pub mod calendar;

pub use money::{Money, Currency, MoneyError, Percentage};
pub use identifiers::{
    AccountId, JournalEntryId, JournalLineId, QuoteId, InvoiceId, DeliveryNoteId,
    ProductId, ClientId, SupplierId, UserId, PaymentId, OutboxMessageId, StockMovementId,
};
pub use error::{CoreError, ErrorKind};
pub use ports::{PortError, DomainPort};
pub use sequence::{
    SequencePort, SequenceGenerator, SequenceError, DocumentKind, NumberFormat, NumberingConfig,
    format_document_number,
};
pub use notification::{DomainNotification, NotificationPort, TracingNotifier};
pub use access::{Actor, Role, Permission, AccessDenied};
pub use calendar::{business_today, business_date};
