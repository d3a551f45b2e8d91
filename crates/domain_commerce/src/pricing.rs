//! Line item pricing
//!
//! Totals are computed by plain functions before a document is saved.
//! Rounding happens per line (HT, then VAT) and document totals are the
//! sums of the rounded line values, so the printed lines always add up to
//! the printed totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{Currency, Money, Percentage, ProductId};

use crate::error::CommerceError;
use crate::snapshot::ProductSnapshot;

/// A priced line on a commercial document
///
/// Prices are copied from the product at the time the line is written and
/// never follow later catalogue changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Option<ProductId>,
    pub reference: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    pub vat_rate: Percentage,
    pub discount: Percentage,
    /// Services are never tracked in stock
    pub is_service: bool,
}

impl LineItem {
    /// Free-text line, not tied to a catalogue product
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Money, vat_rate: Percentage) -> Self {
        Self {
            product_id: None,
            reference: None,
            description: description.into(),
            quantity,
            unit_price,
            vat_rate,
            discount: Percentage::ZERO,
            is_service: false,
        }
    }

    /// Line priced from a product snapshot
    pub fn from_product(product: &ProductSnapshot, quantity: Decimal) -> Self {
        Self {
            product_id: Some(product.product_id),
            reference: Some(product.reference.clone()),
            description: product.name.clone(),
            quantity,
            unit_price: product.unit_price,
            vat_rate: product.vat_rate,
            discount: Percentage::ZERO,
            is_service: product.is_service,
        }
    }

    pub fn with_discount(mut self, discount: Percentage) -> Self {
        self.discount = discount;
        self
    }

    pub fn as_service(mut self) -> Self {
        self.is_service = true;
        self
    }

    pub fn validate(&self) -> Result<(), CommerceError> {
        if self.description.trim().is_empty() {
            return Err(CommerceError::validation("line description must not be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(CommerceError::validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.unit_price.is_negative() {
            return Err(CommerceError::validation(format!(
                "unit price must not be negative, got {}",
                self.unit_price
            )));
        }
        Ok(())
    }
}

/// Amounts of one line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineTotals {
    pub gross_ht: Money,
    pub discount: Money,
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
}

/// Base and tax for one VAT rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VatBreakdown {
    pub rate: Percentage,
    pub base_ht: Money,
    pub vat: Money,
}

/// Amounts of a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
    /// One row per VAT rate, ascending
    pub vat_breakdown: Vec<VatBreakdown>,
}

impl DocumentTotals {
    pub fn zero(currency: Currency) -> Self {
        Self {
            total_ht: Money::zero(currency),
            total_vat: Money::zero(currency),
            total_ttc: Money::zero(currency),
            vat_breakdown: Vec::new(),
        }
    }
}

/// Computes the amounts of one line
///
/// # Errors
///
/// Returns a validation error for a non-positive quantity or a negative price.
pub fn compute_line_totals(item: &LineItem) -> Result<LineTotals, CommerceError> {
    item.validate()?;
    let gross_ht = item.unit_price.multiply(item.quantity).round_to_currency();
    let discount = item.discount.apply(&gross_ht);
    let total_ht = gross_ht.checked_sub(&discount)?;
    let total_vat = item.vat_rate.apply(&total_ht);
    let total_ttc = total_ht.checked_add(&total_vat)?;
    Ok(LineTotals {
        gross_ht,
        discount,
        total_ht,
        total_vat,
        total_ttc,
    })
}

/// Computes document totals and the VAT summary
///
/// # Errors
///
/// Fails on an invalid line or when a line is not priced in `currency`.
pub fn compute_document_totals(items: &[LineItem], currency: Currency) -> Result<DocumentTotals, CommerceError> {
    let mut totals = DocumentTotals::zero(currency);
    let mut by_rate: BTreeMap<Percentage, (Money, Money)> = BTreeMap::new();

    for item in items {
        let line = compute_line_totals(item)?;
        totals.total_ht = totals.total_ht.checked_add(&line.total_ht)?;
        totals.total_vat = totals.total_vat.checked_add(&line.total_vat)?;

        let (base, vat) = by_rate
            .entry(item.vat_rate)
            .or_insert((Money::zero(currency), Money::zero(currency)));
        *base = base.checked_add(&line.total_ht)?;
        *vat = vat.checked_add(&line.total_vat)?;
    }

    totals.total_ttc = totals.total_ht.checked_add(&totals.total_vat)?;
    totals.vat_breakdown = by_rate
        .into_iter()
        .map(|(rate, (base_ht, vat))| VatBreakdown { rate, base_ht, vat })
        .collect();
    Ok(totals)
}

/// HT amount of the service lines, a share of the document `total_ht`
pub fn compute_services_ht(items: &[LineItem], currency: Currency) -> Result<Money, CommerceError> {
    let mut total = Money::zero(currency);
    for item in items.iter().filter(|i| i.is_service) {
        total = total.checked_add(&compute_line_totals(item)?.total_ht)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_line_with_discount() {
        let item = LineItem::new("Chaise", dec!(4), Money::eur(dec!(50)), Percentage::VAT_STANDARD)
            .with_discount(Percentage::new(dec!(10)).unwrap());
        let totals = compute_line_totals(&item).unwrap();

        assert_eq!(totals.gross_ht.amount(), dec!(200));
        assert_eq!(totals.discount.amount(), dec!(20));
        assert_eq!(totals.total_ht.amount(), dec!(180));
        assert_eq!(totals.total_vat.amount(), dec!(36));
        assert_eq!(totals.total_ttc.amount(), dec!(216));
    }

    #[test]
    fn test_rounding_half_away_from_zero_per_line() {
        // 3 x 0.35 = 1.05 HT, VAT 5.5% = 0.05775 -> 0.06
        let item = LineItem::new("Pain", dec!(3), Money::eur(dec!(0.35)), Percentage::VAT_REDUCED);
        let totals = compute_line_totals(&item).unwrap();
        assert_eq!(totals.total_vat.amount(), dec!(0.06));
        assert_eq!(totals.total_ttc.amount(), dec!(1.11));
    }

    #[test]
    fn test_services_share_of_mixed_items() {
        let items = vec![
            LineItem::new("Table", dec!(2), Money::eur(dec!(100)), Percentage::VAT_STANDARD),
            LineItem::new("Montage", dec!(1), Money::eur(dec!(80)), Percentage::VAT_STANDARD)
                .with_discount(Percentage::new(dec!(25)).unwrap())
                .as_service(),
        ];
        let services = compute_services_ht(&items, Currency::EUR).unwrap();
        let totals = compute_document_totals(&items, Currency::EUR).unwrap();

        assert_eq!(services.amount(), dec!(60));
        assert_eq!(totals.total_ht.amount(), dec!(260));
        assert!(compute_services_ht(&items[..1], Currency::EUR).unwrap().is_zero());
    }

    #[test]
    fn test_document_totals_group_by_rate() {
        let items = vec![
            LineItem::new("Table", dec!(1), Money::eur(dec!(1000)), Percentage::VAT_STANDARD),
            LineItem::new("Livre", dec!(2), Money::eur(dec!(10)), Percentage::VAT_REDUCED),
            LineItem::new("Lampe", dec!(1), Money::eur(dec!(50)), Percentage::VAT_STANDARD),
        ];
        let totals = compute_document_totals(&items, Currency::EUR).unwrap();

        assert_eq!(totals.total_ht.amount(), dec!(1070));
        assert_eq!(totals.total_vat.amount(), dec!(211.10));
        assert_eq!(totals.total_ttc.amount(), dec!(1281.10));
        assert_eq!(totals.vat_breakdown.len(), 2);
        assert_eq!(totals.vat_breakdown[0].rate, Percentage::VAT_REDUCED);
        assert_eq!(totals.vat_breakdown[1].base_ht.amount(), dec!(1050));
    }

    #[test]
    fn test_invalid_lines_rejected() {
        let zero_qty = LineItem::new("X", dec!(0), Money::eur(dec!(1)), Percentage::ZERO);
        assert!(compute_line_totals(&zero_qty).is_err());

        let usd = LineItem::new("X", dec!(1), Money::new(dec!(1), Currency::USD), Percentage::ZERO);
        assert!(compute_document_totals(&[usd], Currency::EUR).is_err());
    }
}
