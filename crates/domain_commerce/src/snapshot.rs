//! Frozen copies of master data
//!
//! Documents embed these values instead of referencing the live client,
//! supplier or product, so editing master data never rewrites history.

use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{ClientId, Money, Percentage, ProductId, SupplierId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClientSnapshot {
    pub client_id: ClientId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    /// Intra-community VAT number
    #[validate(length(min = 4, max = 20))]
    pub vat_number: Option<String>,
}

impl ClientSnapshot {
    pub fn new(client_id: ClientId, name: impl Into<String>) -> Self {
        Self {
            client_id,
            name: name.into(),
            email: None,
            address: None,
            vat_number: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SupplierSnapshot {
    pub supplier_id: SupplierId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub vat_number: Option<String>,
}

impl SupplierSnapshot {
    pub fn new(supplier_id: SupplierId, name: impl Into<String>) -> Self {
        Self {
            supplier_id,
            name: name.into(),
            vat_number: None,
        }
    }
}

/// Catalogue data needed to price a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub reference: String,
    pub name: String,
    pub unit_price: Money,
    pub vat_rate: Percentage,
    pub is_service: bool,
}
