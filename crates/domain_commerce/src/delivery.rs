//! Delivery note aggregate
//!
//! ```text
//! PENDING_PREPARATION -> READY_TO_SHIP -> SHIPPED -> PARTIALLY_DELIVERED -> DELIVERED
//!         |                    |            |                 |               |
//!         +---- CANCELLED -----+            +---- CANCELLED / RETURNED -------+
//! ```
//!
//! Leaving the warehouse (entering SHIPPED, PARTIALLY_DELIVERED or
//! DELIVERED from a pre-dispatch state) takes the delivered quantities out
//! of stock; CANCELLED or RETURNED after dispatch puts them back.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{DeliveryNoteId, InvoiceId, QuoteId};

use crate::error::CommerceError;
use crate::pricing::LineItem;
use crate::snapshot::ClientSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    PendingPreparation,
    ReadyToShip,
    Shipped,
    PartiallyDelivered,
    Delivered,
    Cancelled,
    Returned,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::PendingPreparation => "PENDING_PREPARATION",
            DeliveryStatus::ReadyToShip => "READY_TO_SHIP",
            DeliveryStatus::Shipped => "SHIPPED",
            DeliveryStatus::PartiallyDelivered => "PARTIALLY_DELIVERED",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
            DeliveryStatus::Returned => "RETURNED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING_PREPARATION" => Some(DeliveryStatus::PendingPreparation),
            "READY_TO_SHIP" => Some(DeliveryStatus::ReadyToShip),
            "SHIPPED" => Some(DeliveryStatus::Shipped),
            "PARTIALLY_DELIVERED" => Some(DeliveryStatus::PartiallyDelivered),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "CANCELLED" => Some(DeliveryStatus::Cancelled),
            "RETURNED" => Some(DeliveryStatus::Returned),
            _ => None,
        }
    }

    /// Goods have left the warehouse
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Shipped | DeliveryStatus::PartiallyDelivered | DeliveryStatus::Delivered
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Cancelled | DeliveryStatus::Returned)
    }

    fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::PendingPreparation => 0,
            DeliveryStatus::ReadyToShip => 1,
            DeliveryStatus::Shipped => 2,
            DeliveryStatus::PartiallyDelivered => 3,
            DeliveryStatus::Delivered => 4,
            DeliveryStatus::Cancelled | DeliveryStatus::Returned => 5,
        }
    }

    /// Whether the state machine has an edge `self -> target`
    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, target) {
            (from, _) if from.is_terminal() => false,
            (ReadyToShip, PendingPreparation) => true,
            (from, Cancelled) => !from.is_terminal(),
            (from, Returned) => from.is_dispatched(),
            (from, to) => to.rank() > from.rank(),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stock consequence of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Delivered quantities leave the stock
    Decrement,
    /// Delivered quantities come back
    Restore,
}

impl StockEffect {
    pub fn of(from: DeliveryStatus, to: DeliveryStatus) -> Self {
        if to.is_dispatched() && !from.is_dispatched() {
            StockEffect::Decrement
        } else if to.is_terminal() && from.is_dispatched() {
            StockEffect::Restore
        } else {
            StockEffect::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    /// Ordered quantity is `line.quantity`
    pub line: LineItem,
    pub quantity_delivered: Decimal,
}

impl DeliveryItem {
    /// Delivers the full ordered quantity by default
    pub fn new(line: LineItem) -> Self {
        let quantity_delivered = line.quantity;
        Self {
            line,
            quantity_delivered,
        }
    }

    pub fn quantity_ordered(&self) -> Decimal {
        self.line.quantity
    }
}

/// Optional shipping details given with a transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNote {
    pub id: DeliveryNoteId,
    /// e.g. `BL24000001`
    pub number: String,
    pub client: ClientSnapshot,
    pub items: Vec<DeliveryItem>,
    pub delivery_address: Option<String>,
    pub planned_date: Option<NaiveDate>,
    pub status: DeliveryStatus,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub source_quote: Option<(QuoteId, String)>,
    pub invoiced_as: Option<(InvoiceId, String)>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryNote {
    pub fn new(
        number: String,
        client: ClientSnapshot,
        items: Vec<DeliveryItem>,
        delivery_address: Option<String>,
        planned_date: Option<NaiveDate>,
    ) -> Result<Self, CommerceError> {
        for item in &items {
            item.line.validate()?;
            validate_delivered(item.quantity_delivered, item.quantity_ordered())?;
        }
        let delivery_address = delivery_address.or_else(|| client.address.clone());
        let now = Utc::now();
        Ok(Self {
            id: DeliveryNoteId::new(),
            number,
            client,
            items,
            delivery_address,
            planned_date,
            status: DeliveryStatus::PendingPreparation,
            carrier: None,
            tracking_number: None,
            shipped_at: None,
            delivered_at: None,
            source_quote: None,
            invoiced_as: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Changes a line's delivered quantity before dispatch
    pub fn set_delivered_quantity(&mut self, index: usize, quantity: Decimal) -> Result<(), CommerceError> {
        if self.status.is_dispatched() || self.status.is_terminal() {
            return Err(CommerceError::validation(format!(
                "delivery note {} is {}; quantities are frozen",
                self.number, self.status
            )));
        }
        let item = self
            .items
            .get_mut(index)
            .ok_or_else(|| CommerceError::validation(format!("no line {index}")))?;
        validate_delivered(quantity, item.quantity_ordered())?;
        item.quantity_delivered = quantity;
        self.touch();
        Ok(())
    }

    /// Applies a status change and reports its stock effect
    ///
    /// The caller is responsible for carrying out the effect.
    pub fn transition(
        &mut self,
        target: DeliveryStatus,
        shipping: ShippingDetails,
    ) -> Result<StockEffect, CommerceError> {
        let from = self.status;
        if !from.can_transition_to(target) {
            return Err(CommerceError::transition("delivery note", from, target));
        }
        let needs_quantities = !matches!(
            target,
            DeliveryStatus::PendingPreparation | DeliveryStatus::Cancelled
        );
        if needs_quantities {
            if self.items.is_empty() {
                return Err(CommerceError::validation(format!("delivery note {} has no lines", self.number)));
            }
            if let Some(index) = self.items.iter().position(|i| i.quantity_delivered <= Decimal::ZERO) {
                return Err(CommerceError::validation(format!(
                    "line {index} of {} has no delivered quantity",
                    self.number
                )));
            }
        }

        let now = Utc::now();
        if target.is_dispatched() && self.shipped_at.is_none() {
            self.shipped_at = Some(now);
        }
        if target == DeliveryStatus::Delivered {
            self.delivered_at = Some(now);
        }
        if shipping.carrier.is_some() {
            self.carrier = shipping.carrier;
        }
        if shipping.tracking_number.is_some() {
            self.tracking_number = shipping.tracking_number;
        }
        self.status = target;
        self.touch();
        Ok(StockEffect::of(from, target))
    }

    /// Checks the note can be invoiced, without changing it
    pub fn ensure_invoiceable(&self) -> Result<(), CommerceError> {
        if self.invoiced_as.is_some() {
            return Err(CommerceError::AlreadyConverted(self.number.clone()));
        }
        if !self.status.is_dispatched() {
            return Err(CommerceError::validation(format!(
                "delivery note {} is {} and cannot be invoiced",
                self.number, self.status
            )));
        }
        Ok(())
    }

    /// Lines to invoice: delivered quantities at the snapshotted prices
    pub fn invoice_lines(&self) -> Vec<LineItem> {
        self.items
            .iter()
            .filter(|i| i.quantity_delivered > Decimal::ZERO)
            .map(|i| LineItem {
                quantity: i.quantity_delivered,
                ..i.line.clone()
            })
            .collect()
    }

    pub(crate) fn mark_invoiced(&mut self, invoice_id: InvoiceId, number: String) -> Result<(), CommerceError> {
        self.ensure_invoiceable()?;
        self.invoiced_as = Some((invoice_id, number));
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Delivered quantity stays within `0..=ordered`
fn validate_delivered(quantity: Decimal, ordered: Decimal) -> Result<(), CommerceError> {
    if quantity < Decimal::ZERO {
        return Err(CommerceError::validation(format!(
            "delivered quantity must not be negative, got {quantity}"
        )));
    }
    if quantity > ordered {
        return Err(CommerceError::validation(format!(
            "delivered quantity {quantity} exceeds the ordered {ordered}"
        )));
    }
    Ok(())
}
