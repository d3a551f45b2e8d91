//! Stock-relevant product slice and stock movements

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{DomainNotification, ProductId, StockMovementId};

use crate::error::InventoryError;

/// What the stock ledger knows about a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub product_id: ProductId,
    /// Product reference shown in alerts (SKU)
    pub reference: String,
    pub name: String,
    pub stock_quantity: Decimal,
    /// At or below this quantity a low-stock alert is raised
    pub critical_threshold: Decimal,
    /// Services carry no stock at all
    pub is_service: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    pub fn new(product_id: ProductId, reference: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            product_id,
            reference: reference.into(),
            name: name.into(),
            stock_quantity: Decimal::ZERO,
            critical_threshold: Decimal::ZERO,
            is_service: false,
            updated_at: Utc::now(),
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.stock_quantity = quantity;
        self
    }

    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.critical_threshold = threshold;
        self
    }

    pub fn service(mut self) -> Self {
        self.is_service = true;
        self
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.reference.trim().is_empty() {
            return Err(InventoryError::Validation("product reference must not be empty".into()));
        }
        if self.stock_quantity < Decimal::ZERO {
            return Err(InventoryError::Validation("stock quantity must not be negative".into()));
        }
        if self.critical_threshold < Decimal::ZERO {
            return Err(InventoryError::Validation("critical threshold must not be negative".into()));
        }
        Ok(())
    }

    pub fn is_low(&self) -> bool {
        !self.is_service && self.stock_quantity <= self.critical_threshold
    }
}

/// Why stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Goods left with a delivery note
    Delivery,
    /// Goods came back (return or cancellation after dispatch)
    Return,
    /// Inventory count correction
    Adjustment,
    /// Undo of a movement whose enclosing operation failed
    Compensation,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Delivery => "delivery",
            MovementReason::Return => "return",
            MovementReason::Adjustment => "adjustment",
            MovementReason::Compensation => "compensation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delivery" => Some(MovementReason::Delivery),
            "return" => Some(MovementReason::Return),
            "adjustment" => Some(MovementReason::Adjustment),
            "compensation" => Some(MovementReason::Compensation),
            _ => None,
        }
    }
}

impl fmt::Display for MovementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded stock movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub product_id: ProductId,
    pub delta: Decimal,
    pub reason: MovementReason,
    /// Document that caused the movement (e.g. `BL24000003`)
    pub source: Option<String>,
    /// Unique per movement; replays return the first movement
    pub idempotency_key: String,
    pub quantity_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Stock change requested by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub delta: Decimal,
    pub reason: MovementReason,
    pub source: Option<String>,
    pub idempotency_key: String,
}

impl StockRequest {
    pub fn new(
        product_id: ProductId,
        delta: Decimal,
        reason: MovementReason,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            delta,
            reason,
            source: None,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Outcome of one applied request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub reference: String,
    pub delta: Decimal,
    pub quantity_after: Decimal,
    pub critical_threshold: Decimal,
    pub idempotency_key: String,
    /// False when the request was a replay of an earlier movement
    pub applied: bool,
}

impl StockChange {
    pub fn is_low(&self) -> bool {
        self.quantity_after <= self.critical_threshold
    }

    /// `stock_updated`, plus `low_stock_alert` after a decrement at or under the threshold
    pub fn notifications(&self) -> Vec<DomainNotification> {
        let mut notifications = vec![DomainNotification::StockUpdated {
            product_id: self.product_id,
            reference: self.reference.clone(),
            quantity: self.quantity_after,
        }];
        if self.delta < Decimal::ZERO && self.is_low() {
            notifications.push(DomainNotification::LowStock {
                product_id: self.product_id,
                reference: self.reference.clone(),
                quantity: self.quantity_after,
                threshold: self.critical_threshold,
            });
        }
        notifications
    }
}
