//! Document conversions
//!
//! The new document copies the client snapshot and priced lines of its
//! source; nothing is re-read from master data. Numbers are assigned by the
//! caller once the conversion is known to be legal, then
//! [`link_quote`]/[`link_delivery_note`] mark the source so it can never be
//! converted again.

use chrono::NaiveDate;

use crate::commands::ConvertToInvoiceCommand;
use crate::delivery::{DeliveryItem, DeliveryNote};
use crate::error::CommerceError;
use crate::invoice::{Invoice, InvoiceOrigin};
use crate::quote::{Quote, QuoteConversion};

/// Draft invoice for an ACCEPTED quote (number left empty)
pub fn invoice_from_quote(quote: &Quote, command: &ConvertToInvoiceCommand) -> Result<Invoice, CommerceError> {
    quote.ensure_convertible()?;
    Invoice::new(
        String::new(),
        quote.client.clone(),
        quote.items.clone(),
        quote.currency,
        command.issue_date,
        command.due_date,
        InvoiceOrigin::Quote {
            quote_id: quote.id,
            number: quote.number.clone(),
        },
    )
}

/// Delivery note for an ACCEPTED quote, delivering the quoted quantities
pub fn delivery_note_from_quote(quote: &Quote, planned_date: Option<NaiveDate>) -> Result<DeliveryNote, CommerceError> {
    quote.ensure_convertible()?;
    let items = quote.items.iter().cloned().map(DeliveryItem::new).collect();
    let mut note = DeliveryNote::new(String::new(), quote.client.clone(), items, None, planned_date)?;
    note.source_quote = Some((quote.id, quote.number.clone()));
    Ok(note)
}

/// Draft invoice for the delivered quantities of a dispatched note
pub fn invoice_from_delivery_note(
    note: &DeliveryNote,
    command: &ConvertToInvoiceCommand,
) -> Result<Invoice, CommerceError> {
    note.ensure_invoiceable()?;
    let lines = note.invoice_lines();
    let currency = lines
        .first()
        .map(|l| l.unit_price.currency())
        .ok_or_else(|| CommerceError::validation(format!("delivery note {} has nothing delivered", note.number)))?;
    Invoice::new(
        String::new(),
        note.client.clone(),
        lines,
        currency,
        command.issue_date,
        command.due_date,
        InvoiceOrigin::DeliveryNote {
            delivery_note_id: note.id,
            number: note.number.clone(),
        },
    )
}

/// Marks the quote as converted into `target`
pub fn link_quote(quote: &mut Quote, target: QuoteConversion) -> Result<(), CommerceError> {
    quote.mark_converted(target)
}

/// Marks the delivery note as invoiced by `invoice`
pub fn link_delivery_note(note: &mut DeliveryNote, invoice: &Invoice) -> Result<(), CommerceError> {
    note.mark_invoiced(invoice.id, invoice.number.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryStatus, ShippingDetails};
    use crate::pricing::LineItem;
    use crate::snapshot::ClientSnapshot;
    use core_kernel::{ClientId, Currency, Money, Percentage};
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn accepted_quote() -> Quote {
        let mut quote = Quote::new(
            "DEV24000001".into(),
            ClientSnapshot::new(ClientId::new(), "Dupont SARL"),
            vec![LineItem::new("Table", dec!(5), Money::eur(dec!(100)), Percentage::VAT_STANDARD)],
            Currency::EUR,
            date(1),
            date(31),
        )
        .unwrap();
        quote.send().unwrap();
        quote.accept(date(2)).unwrap();
        quote
    }

    fn command() -> ConvertToInvoiceCommand {
        ConvertToInvoiceCommand {
            issue_date: date(5),
            due_date: Some(date(30)),
        }
    }

    #[test]
    fn test_quote_converted_at_most_once() {
        let mut quote = accepted_quote();
        let mut invoice = invoice_from_quote(&quote, &command()).unwrap();
        invoice.number = "FAC24000001".into();
        link_quote(
            &mut quote,
            QuoteConversion::Invoice {
                invoice_id: invoice.id,
                number: invoice.number.clone(),
            },
        )
        .unwrap();

        assert!(matches!(invoice_from_quote(&quote, &command()), Err(CommerceError::AlreadyConverted(_))));
        assert!(matches!(delivery_note_from_quote(&quote, None), Err(CommerceError::AlreadyConverted(_))));
    }

    #[test]
    fn test_snapshot_is_copied() {
        let mut quote = accepted_quote();
        let invoice = invoice_from_quote(&quote, &command()).unwrap();
        quote.client.name = "Renamed".into();
        assert_eq!(invoice.client.name, "Dupont SARL");
        assert_eq!(invoice.totals, quote.totals);
    }

    #[test]
    fn test_delivery_note_invoices_delivered_quantities() {
        let quote = accepted_quote();
        let mut note = delivery_note_from_quote(&quote, Some(date(10))).unwrap();
        note.set_delivered_quantity(0, dec!(3)).unwrap();
        assert!(invoice_from_delivery_note(&note, &command()).is_err());

        note.transition(DeliveryStatus::Shipped, ShippingDetails::default()).unwrap();
        let invoice = invoice_from_delivery_note(&note, &command()).unwrap();
        assert_eq!(invoice.totals.total_ht.amount(), dec!(300));
        link_delivery_note(&mut note, &invoice).unwrap();
        assert!(invoice_from_delivery_note(&note, &command()).is_err());
    }
}
