//! Commerce Domain - Document Lifecycles
//!
//! Quotes, invoices and delivery notes with their state machines, the
//! conversions between them and the workflow service that turns each
//! lifecycle step into ledger postings and stock movements.
//!
//! ```text
//! Quote ──accept──► convert ──► Invoice ──send──► sale entry
//!                      │                 ──pay───► payment entry
//!                      └────► DeliveryNote ──ship──► stock out
//!                                          ──return► stock back
//! ```
//!
//! Documents copy the client and product data they were built from, so
//! later master-data edits never change an issued document.

pub mod pricing;
pub mod snapshot;
pub mod quote;
pub mod invoice;
pub mod delivery;
pub mod commands;
pub mod conversion;
pub mod outbox;
pub mod ports;
pub mod workflow;
pub mod error;

pub use pricing::{compute_document_totals, compute_line_totals, compute_services_ht, DocumentTotals, LineItem, LineTotals, VatBreakdown};
pub use snapshot::{ClientSnapshot, ProductSnapshot, SupplierSnapshot};
pub use quote::{Quote, QuoteConversion, QuoteStatus};
pub use invoice::{derive_status, Closure, Invoice, InvoiceOrigin, InvoiceStatus, Payment, StatusInputs};
pub use delivery::{DeliveryItem, DeliveryNote, DeliveryStatus, ShippingDetails, StockEffect};
pub use commands::{
    CloseInvoiceCommand, ConvertToInvoiceCommand, CreateDeliveryNoteCommand, CreateInvoiceCommand,
    CreateQuoteCommand, DeliveryTransitionCommand, PaymentMethod, PurchaseCommand, RecordPaymentCommand,
    ReversePaymentCommand,
};
pub use outbox::{OutboxCommand, OutboxMessage, OutboxReport, OutboxSettings, OutboxStatus};
pub use ports::{ChangeSet, DocumentPort, OutboxPort, Versioned};
pub use workflow::{payment_key, purchase_document, sale_key, DocumentWorkflow};
pub use error::CommerceError;
