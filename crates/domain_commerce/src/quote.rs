//! Quote aggregate
//!
//! ```text
//! DRAFT -> SENT -> ACCEPTED -> CONVERTED_TO_INVOICE
//!               |           \-> CONVERTED_TO_DELIVERY
//!               +-> REJECTED
//!               +-> EXPIRED
//! ```
//!
//! A quote is converted at most once; both conversion states are terminal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Actor, Currency, DeliveryNoteId, InvoiceId, Permission, QuoteId};

use crate::error::CommerceError;
use crate::pricing::{compute_document_totals, DocumentTotals, LineItem};
use crate::snapshot::ClientSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
    ConvertedToInvoice,
    ConvertedToDelivery,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "DRAFT",
            QuoteStatus::Sent => "SENT",
            QuoteStatus::Accepted => "ACCEPTED",
            QuoteStatus::Rejected => "REJECTED",
            QuoteStatus::Expired => "EXPIRED",
            QuoteStatus::ConvertedToInvoice => "CONVERTED_TO_INVOICE",
            QuoteStatus::ConvertedToDelivery => "CONVERTED_TO_DELIVERY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(QuoteStatus::Draft),
            "SENT" => Some(QuoteStatus::Sent),
            "ACCEPTED" => Some(QuoteStatus::Accepted),
            "REJECTED" => Some(QuoteStatus::Rejected),
            "EXPIRED" => Some(QuoteStatus::Expired),
            "CONVERTED_TO_INVOICE" => Some(QuoteStatus::ConvertedToInvoice),
            "CONVERTED_TO_DELIVERY" => Some(QuoteStatus::ConvertedToDelivery),
            _ => None,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, QuoteStatus::ConvertedToInvoice | QuoteStatus::ConvertedToDelivery)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document a quote was converted into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteConversion {
    Invoice { invoice_id: InvoiceId, number: String },
    DeliveryNote { delivery_note_id: DeliveryNoteId, number: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    /// e.g. `DEV24000001`
    pub number: String,
    pub client: ClientSnapshot,
    pub items: Vec<LineItem>,
    pub currency: Currency,
    pub totals: DocumentTotals,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: QuoteStatus,
    pub notes: Option<String>,
    pub converted_to: Option<QuoteConversion>,
    pub sent_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Incremented on every mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Creates a DRAFT quote with computed totals
    pub fn new(
        number: String,
        client: ClientSnapshot,
        items: Vec<LineItem>,
        currency: Currency,
        issue_date: NaiveDate,
        valid_until: NaiveDate,
    ) -> Result<Self, CommerceError> {
        if valid_until < issue_date {
            return Err(CommerceError::validation("valid_until must not precede the issue date"));
        }
        let totals = compute_document_totals(&items, currency)?;
        let now = Utc::now();
        Ok(Self {
            id: QuoteId::new(),
            number,
            client,
            items,
            currency,
            totals,
            issue_date,
            valid_until,
            status: QuoteStatus::Draft,
            notes: None,
            converted_to: None,
            sent_at: None,
            decided_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the items and recomputes totals
    ///
    /// Allowed in DRAFT. Later states require `ForceTransition`; converted
    /// quotes are never edited.
    pub fn replace_items(&mut self, actor: &Actor, items: Vec<LineItem>) -> Result<(), CommerceError> {
        if self.status.is_converted() {
            return Err(CommerceError::AlreadyConverted(self.number.clone()));
        }
        if self.status != QuoteStatus::Draft {
            actor.ensure(Permission::ForceTransition)?;
            tracing::warn!(
                quote = %self.number,
                status = %self.status,
                user = %actor.user_id,
                "Quote items edited outside DRAFT by override"
            );
        }
        self.totals = compute_document_totals(&items, self.currency)?;
        self.items = items;
        self.touch();
        Ok(())
    }

    pub fn send(&mut self) -> Result<(), CommerceError> {
        self.expect_status(QuoteStatus::Draft, QuoteStatus::Sent)?;
        if self.items.is_empty() {
            return Err(CommerceError::validation("a quote needs at least one item to be sent"));
        }
        self.status = QuoteStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Accepts a SENT quote that is still valid on `today`
    pub fn accept(&mut self, today: NaiveDate) -> Result<(), CommerceError> {
        self.expect_status(QuoteStatus::Sent, QuoteStatus::Accepted)?;
        if self.is_past_validity(today) {
            return Err(CommerceError::validation(format!(
                "quote {} expired on {}",
                self.number, self.valid_until
            )));
        }
        self.decide(QuoteStatus::Accepted);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), CommerceError> {
        self.expect_status(QuoteStatus::Sent, QuoteStatus::Rejected)?;
        self.decide(QuoteStatus::Rejected);
        Ok(())
    }

    /// Moves a SENT quote past its validity to EXPIRED
    ///
    /// Returns whether the status changed.
    pub fn expire_if_due(&mut self, today: NaiveDate) -> bool {
        if self.status == QuoteStatus::Sent && self.is_past_validity(today) {
            self.decide(QuoteStatus::Expired);
            return true;
        }
        false
    }

    pub fn is_past_validity(&self, today: NaiveDate) -> bool {
        self.valid_until < today
    }

    /// Only never-converted drafts may be deleted
    pub fn ensure_deletable(&self) -> Result<(), CommerceError> {
        if self.converted_to.is_some() {
            return Err(CommerceError::AlreadyConverted(self.number.clone()));
        }
        if self.status != QuoteStatus::Draft {
            return Err(CommerceError::validation(format!(
                "quote {} is {} and can no longer be deleted",
                self.number, self.status
            )));
        }
        Ok(())
    }

    /// Checks the quote can be converted, without changing it
    pub fn ensure_convertible(&self) -> Result<(), CommerceError> {
        if self.status.is_converted() || self.converted_to.is_some() {
            return Err(CommerceError::AlreadyConverted(self.number.clone()));
        }
        if self.status != QuoteStatus::Accepted {
            return Err(CommerceError::transition(
                "quote",
                self.status,
                "CONVERTED_TO_INVOICE|CONVERTED_TO_DELIVERY",
            ));
        }
        Ok(())
    }

    /// Records the conversion; terminal
    pub(crate) fn mark_converted(&mut self, conversion: QuoteConversion) -> Result<(), CommerceError> {
        self.ensure_convertible()?;
        self.status = match conversion {
            QuoteConversion::Invoice { .. } => QuoteStatus::ConvertedToInvoice,
            QuoteConversion::DeliveryNote { .. } => QuoteStatus::ConvertedToDelivery,
        };
        self.converted_to = Some(conversion);
        self.touch();
        Ok(())
    }

    fn expect_status(&self, expected: QuoteStatus, target: QuoteStatus) -> Result<(), CommerceError> {
        if self.status != expected {
            return Err(CommerceError::transition("quote", self.status, target));
        }
        Ok(())
    }

    fn decide(&mut self, status: QuoteStatus) {
        self.status = status;
        self.decided_at = Some(Utc::now());
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ClientId, Money, Percentage, Role, UserId};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quote() -> Quote {
        Quote::new(
            "DEV24000001".into(),
            ClientSnapshot::new(ClientId::new(), "Dupont SARL"),
            vec![LineItem::new("Table", dec!(2), Money::eur(dec!(100)), Percentage::VAT_STANDARD)],
            Currency::EUR,
            date(2024, 3, 1),
            date(2024, 3, 31),
        )
        .unwrap()
    }

    #[test]
    fn test_happy_path() {
        let mut q = quote();
        assert_eq!(q.totals.total_ttc.amount(), dec!(240));
        q.send().unwrap();
        q.accept(date(2024, 3, 10)).unwrap();
        assert_eq!(q.status, QuoteStatus::Accepted);
        assert_eq!(q.version, 3);
    }

    #[test]
    fn test_cannot_accept_draft_or_expired() {
        let mut q = quote();
        assert!(matches!(q.accept(date(2024, 3, 2)), Err(CommerceError::InvalidTransition { .. })));
        q.send().unwrap();
        assert!(q.accept(date(2024, 4, 2)).is_err());
        assert!(q.expire_if_due(date(2024, 4, 2)));
        assert_eq!(q.status, QuoteStatus::Expired);
    }

    #[test]
    fn test_expire_only_after_validity() {
        let mut q = quote();
        q.send().unwrap();
        assert!(!q.expire_if_due(date(2024, 3, 31)));
        assert_eq!(q.status, QuoteStatus::Sent);
    }

    #[test]
    fn test_edit_outside_draft_needs_override() {
        let mut q = quote();
        q.send().unwrap();
        let items = vec![LineItem::new("Chaise", dec!(1), Money::eur(dec!(40)), Percentage::VAT_STANDARD)];

        let sales = Actor::new(UserId::new(), Role::Sales);
        assert!(matches!(
            q.replace_items(&sales, items.clone()),
            Err(CommerceError::Forbidden(_))
        ));

        let admin = Actor::new(UserId::new(), Role::Admin);
        q.replace_items(&admin, items).unwrap();
        assert_eq!(q.totals.total_ht.amount(), dec!(40));
    }

    #[test]
    fn test_converted_once() {
        let mut q = quote();
        q.send().unwrap();
        q.accept(date(2024, 3, 5)).unwrap();
        q.mark_converted(QuoteConversion::Invoice {
            invoice_id: InvoiceId::new(),
            number: "FAC24000001".into(),
        })
        .unwrap();

        let again = q.mark_converted(QuoteConversion::DeliveryNote {
            delivery_note_id: DeliveryNoteId::new(),
            number: "BL24000001".into(),
        });
        assert!(matches!(again, Err(CommerceError::AlreadyConverted(_))));
        assert!(q.ensure_deletable().is_err());
    }
}
