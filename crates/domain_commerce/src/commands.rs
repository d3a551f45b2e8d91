//! Typed commands accepted by the document workflow
//!
//! Each command is validated before it reaches an aggregate.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::PaymentId;
use domain_accounting::SettlementChannel;

use crate::delivery::{DeliveryStatus, ShippingDetails};
use crate::pricing::LineItem;
use crate::snapshot::{ClientSnapshot, SupplierSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cheque,
    Cash,
}

impl PaymentMethod {
    /// Treasury account family the payment lands in
    pub fn channel(&self) -> SettlementChannel {
        match self {
            PaymentMethod::Cash => SettlementChannel::Cash,
            _ => SettlementChannel::Bank,
        }
    }
}

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateQuoteCommand {
    #[validate(nested)]
    pub client: ClientSnapshot,
    #[validate(length(min = 1, message = "a quote needs at least one item"))]
    pub items: Vec<LineItem>,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceCommand {
    #[validate(nested)]
    pub client: ClientSnapshot,
    pub items: Vec<LineItem>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateDeliveryNoteCommand {
    #[validate(nested)]
    pub client: ClientSnapshot,
    #[validate(length(min = 1, message = "a delivery note needs at least one item"))]
    pub items: Vec<LineItem>,
    pub delivery_address: Option<String>,
    pub planned_date: Option<NaiveDate>,
}

/// Dates of the invoice produced by a conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertToInvoiceCommand {
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RecordPaymentCommand {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReversePaymentCommand {
    pub payment_id: PaymentId,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CloseInvoiceCommand {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTransitionCommand {
    pub target: DeliveryStatus,
    #[serde(default)]
    pub shipping: ShippingDetails,
}

impl DeliveryTransitionCommand {
    pub fn to(target: DeliveryStatus) -> Self {
        Self {
            target,
            shipping: ShippingDetails::default(),
        }
    }
}

/// A supplier invoice to book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PurchaseCommand {
    #[validate(nested)]
    pub supplier: SupplierSnapshot,
    /// Supplier's invoice number
    #[validate(length(min = 1, max = 100))]
    pub reference: String,
    pub date: NaiveDate,
    #[validate(length(min = 1, message = "a purchase needs at least one item"))]
    pub items: Vec<LineItem>,
    /// Charge account overriding the default purchases account
    pub expense_account: Option<String>,
}
