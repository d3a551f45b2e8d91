//! Invoice aggregate
//!
//! The status of a sent invoice is not set directly: it is derived from the
//! payments, the due date and the current date by [`derive_status`] after
//! every mutation that touches them. CANCELLED and VOIDED are absorbing.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{
    Actor, ClientId, Currency, DeliveryNoteId, InvoiceId, Money, PaymentId, Permission, QuoteId, UserId,
};

use crate::commands::{PaymentMethod, RecordPaymentCommand, ReversePaymentCommand};
use crate::error::CommerceError;
use crate::pricing::{compute_document_totals, compute_services_ht, DocumentTotals, LineItem};
use crate::snapshot::ClientSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    ViewedByClient,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
    Voided,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::ViewedByClient => "VIEWED_BY_CLIENT",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Voided => "VOIDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "SENT" => Some(InvoiceStatus::Sent),
            "VIEWED_BY_CLIENT" => Some(InvoiceStatus::ViewedByClient),
            "PARTIALLY_PAID" => Some(InvoiceStatus::PartiallyPaid),
            "PAID" => Some(InvoiceStatus::Paid),
            "OVERDUE" => Some(InvoiceStatus::Overdue),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            "VOIDED" => Some(InvoiceStatus::Voided),
            _ => None,
        }
    }

    /// CANCELLED and VOIDED are never left
    pub fn is_absorbing(&self) -> bool {
        matches!(self, InvoiceStatus::Cancelled | InvoiceStatus::Voided)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the status derivation depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusInputs {
    pub total_ttc: Decimal,
    pub amount_paid: Decimal,
    pub due_date: Option<NaiveDate>,
    pub today: NaiveDate,
    pub ever_sent: bool,
    pub viewed: bool,
}

/// Derives the invoice status
///
/// Payment-derived states win over OVERDUE; an unsent invoice without
/// payments stays DRAFT; absorbing states are returned unchanged.
pub fn derive_status(current: InvoiceStatus, inputs: &StatusInputs) -> InvoiceStatus {
    if current.is_absorbing() {
        return current;
    }
    if inputs.total_ttc > Decimal::ZERO && inputs.amount_paid >= inputs.total_ttc {
        return InvoiceStatus::Paid;
    }
    if inputs.amount_paid > Decimal::ZERO && inputs.amount_paid < inputs.total_ttc {
        return InvoiceStatus::PartiallyPaid;
    }
    if !inputs.ever_sent {
        return InvoiceStatus::Draft;
    }
    if inputs.due_date.is_some_and(|due| due < inputs.today) {
        return InvoiceStatus::Overdue;
    }
    if inputs.viewed {
        return InvoiceStatus::ViewedByClient;
    }
    InvoiceStatus::Sent
}

/// A payment line; reversals are negative and point at the payment they undo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: Money,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub reverses: Option<PaymentId>,
    pub recorded_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }
}

/// Where an invoice came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvoiceOrigin {
    Direct,
    Quote { quote_id: QuoteId, number: String },
    DeliveryNote { delivery_note_id: DeliveryNoteId, number: String },
}

/// Why and by whom an invoice was cancelled or voided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub reason: String,
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// e.g. `FAC24000001`
    pub number: String,
    pub client: ClientSnapshot,
    pub items: Vec<LineItem>,
    pub currency: Currency,
    pub totals: DocumentTotals,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub payments: Vec<Payment>,
    /// Signed sum of `payments`
    pub amount_paid: Money,
    pub origin: InvoiceOrigin,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub closure: Option<Closure>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a DRAFT invoice with computed totals
    pub fn new(
        number: String,
        client: ClientSnapshot,
        items: Vec<LineItem>,
        currency: Currency,
        issue_date: NaiveDate,
        due_date: Option<NaiveDate>,
        origin: InvoiceOrigin,
    ) -> Result<Self, CommerceError> {
        if due_date.is_some_and(|due| due < issue_date) {
            return Err(CommerceError::validation("due date must not precede the issue date"));
        }
        let totals = compute_document_totals(&items, currency)?;
        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new(),
            number,
            client,
            items,
            currency,
            totals,
            issue_date,
            due_date,
            status: InvoiceStatus::Draft,
            payments: Vec::new(),
            amount_paid: Money::zero(currency),
            origin,
            sent_at: None,
            viewed_at: None,
            closure: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client.client_id
    }

    pub fn was_sent(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Amount still to be paid
    pub fn outstanding(&self) -> Result<Money, CommerceError> {
        Ok(self.totals.total_ttc.checked_sub(&self.amount_paid)?)
    }

    /// True when every line is a service
    /// HT amount of the service lines
    pub fn services_ht(&self) -> Result<Money, CommerceError> {
        compute_services_ht(&self.items, self.currency)
    }

    /// Replaces the items of a DRAFT invoice
    pub fn replace_items(&mut self, items: Vec<LineItem>) -> Result<(), CommerceError> {
        if self.status != InvoiceStatus::Draft {
            return Err(CommerceError::validation(format!(
                "invoice {} is {} and can no longer be edited",
                self.number, self.status
            )));
        }
        self.totals = compute_document_totals(&items, self.currency)?;
        self.items = items;
        self.touch();
        Ok(())
    }

    /// DRAFT -> SENT (or OVERDUE when already past due)
    pub fn mark_sent(&mut self, today: NaiveDate) -> Result<(), CommerceError> {
        if self.status != InvoiceStatus::Draft {
            return Err(CommerceError::transition("invoice", self.status, InvoiceStatus::Sent));
        }
        if self.items.is_empty() || !self.totals.total_ttc.is_positive() {
            return Err(CommerceError::validation(format!(
                "invoice {} has nothing to bill",
                self.number
            )));
        }
        self.sent_at = Some(Utc::now());
        self.rederive(today);
        self.touch();
        Ok(())
    }

    /// SENT or OVERDUE -> VIEWED_BY_CLIENT
    pub fn mark_viewed(&mut self, today: NaiveDate) -> Result<(), CommerceError> {
        if !matches!(self.status, InvoiceStatus::Sent | InvoiceStatus::Overdue) {
            return Err(CommerceError::transition(
                "invoice",
                self.status,
                InvoiceStatus::ViewedByClient,
            ));
        }
        self.viewed_at = Some(Utc::now());
        // an invoice already past due stays OVERDUE
        self.rederive(today);
        self.touch();
        Ok(())
    }

    /// Records a payment; overpayment is refused
    ///
    /// A DRAFT invoice has no sale entry yet and cannot be paid.
    pub fn record_payment(
        &mut self,
        command: &RecordPaymentCommand,
        today: NaiveDate,
    ) -> Result<Payment, CommerceError> {
        if self.status.is_absorbing() || self.status == InvoiceStatus::Draft || self.status == InvoiceStatus::Paid {
            return Err(CommerceError::validation(format!(
                "invoice {} is {} and cannot receive payments",
                self.number, self.status
            )));
        }
        let amount = Money::new(command.amount, self.currency).round_to_currency();
        if !amount.is_positive() {
            return Err(CommerceError::validation("payment amount must be positive"));
        }
        let outstanding = self.outstanding()?;
        if amount.amount() > outstanding.amount() {
            return Err(CommerceError::validation(format!(
                "payment of {} exceeds the outstanding {} on {}",
                amount, outstanding, self.number
            )));
        }

        let payment = Payment {
            id: PaymentId::new(),
            amount,
            date: command.date,
            method: command.method,
            reference: command.reference.clone(),
            reverses: None,
            recorded_at: Utc::now(),
        };
        self.push_payment(payment.clone(), today)?;
        Ok(payment)
    }

    /// Cancels a payment with a negative counter-payment
    pub fn reverse_payment(
        &mut self,
        command: &ReversePaymentCommand,
        today: NaiveDate,
    ) -> Result<Payment, CommerceError> {
        if self.status.is_absorbing() {
            return Err(CommerceError::validation(format!(
                "invoice {} is {}",
                self.number, self.status
            )));
        }
        let original = self
            .payments
            .iter()
            .find(|p| p.id == command.payment_id && !p.is_reversal())
            .ok_or_else(|| CommerceError::validation(format!("unknown payment {}", command.payment_id)))?;
        if self.payments.iter().any(|p| p.reverses == Some(original.id)) {
            return Err(CommerceError::validation(format!(
                "payment {} was already reversed",
                original.id
            )));
        }

        let reversal = Payment {
            id: PaymentId::new(),
            amount: -original.amount,
            date: command.date,
            method: original.method,
            reference: Some(command.reason.clone()),
            reverses: Some(original.id),
            recorded_at: Utc::now(),
        };
        self.push_payment(reversal.clone(), today)?;
        Ok(reversal)
    }

    pub fn set_due_date(&mut self, due_date: Option<NaiveDate>, today: NaiveDate) -> Result<(), CommerceError> {
        if self.status.is_absorbing() {
            return Err(CommerceError::validation(format!("invoice {} is {}", self.number, self.status)));
        }
        if due_date.is_some_and(|due| due < self.issue_date) {
            return Err(CommerceError::validation("due date must not precede the issue date"));
        }
        self.due_date = due_date;
        self.rederive(today);
        self.touch();
        Ok(())
    }

    /// Re-derives the status for `today`; returns whether it changed
    pub fn refresh_overdue(&mut self, today: NaiveDate) -> bool {
        let before = self.status;
        self.rederive(today);
        if self.status != before {
            self.touch();
            return true;
        }
        false
    }

    /// Cancels an unpaid invoice
    pub fn cancel(&mut self, actor: &Actor, reason: &str) -> Result<(), CommerceError> {
        if !matches!(
            self.status,
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::ViewedByClient | InvoiceStatus::Overdue
        ) {
            return Err(CommerceError::transition("invoice", self.status, InvoiceStatus::Cancelled));
        }
        if !self.amount_paid.is_zero() {
            return Err(CommerceError::validation(format!(
                "invoice {} has payments and must be voided instead",
                self.number
            )));
        }
        self.close(InvoiceStatus::Cancelled, actor, reason);
        Ok(())
    }

    /// Voids the invoice; once payments exist only an override may do so
    pub fn void(&mut self, actor: &Actor, reason: &str) -> Result<(), CommerceError> {
        if self.status.is_absorbing() {
            return Err(CommerceError::transition("invoice", self.status, InvoiceStatus::Voided));
        }
        if !self.amount_paid.is_zero() {
            actor.ensure(Permission::ForceTransition)?;
            tracing::warn!(invoice = %self.number, user = %actor.user_id, "Voiding an invoice with payments");
        }
        self.close(InvoiceStatus::Voided, actor, reason);
        Ok(())
    }

    fn push_payment(&mut self, payment: Payment, today: NaiveDate) -> Result<(), CommerceError> {
        self.amount_paid = self.amount_paid.checked_add(&payment.amount)?;
        if self.amount_paid.is_negative() {
            self.amount_paid = Money::zero(self.currency);
        }
        self.payments.push(payment);
        self.rederive(today);
        self.touch();
        Ok(())
    }

    fn close(&mut self, status: InvoiceStatus, actor: &Actor, reason: &str) {
        self.status = status;
        self.closure = Some(Closure {
            reason: reason.to_string(),
            by: actor.user_id,
            at: Utc::now(),
        });
        self.touch();
    }

    fn status_inputs(&self, today: NaiveDate) -> StatusInputs {
        StatusInputs {
            total_ttc: self.totals.total_ttc.amount(),
            amount_paid: self.amount_paid.amount(),
            due_date: self.due_date,
            today,
            ever_sent: self.was_sent(),
            viewed: self.viewed_at.is_some(),
        }
    }

    fn rederive(&mut self, today: NaiveDate) {
        let derived = derive_status(self.status, &self.status_inputs(today));
        if derived != self.status {
            tracing::debug!(invoice = %self.number, from = %self.status, to = %derived, "Invoice status derived");
        }
        self.status = derived;
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Percentage, Role};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn inputs(paid: Decimal, due: NaiveDate, today: NaiveDate) -> StatusInputs {
        StatusInputs {
            total_ttc: dec!(1000),
            amount_paid: paid,
            due_date: Some(due),
            today,
            ever_sent: true,
            viewed: false,
        }
    }

    fn sent_invoice() -> Invoice {
        let mut invoice = Invoice::new(
            "FAC24000001".into(),
            ClientSnapshot::new(ClientId::new(), "Dupont SARL"),
            vec![LineItem::new("Table", dec!(1), Money::eur(dec!(1000)), Percentage::VAT_STANDARD)],
            Currency::EUR,
            date(2024, 3, 1),
            Some(date(2024, 3, 31)),
            InvoiceOrigin::Direct,
        )
        .unwrap();
        invoice.mark_sent(date(2024, 3, 1)).unwrap();
        invoice
    }

    fn pay(amount: Decimal) -> RecordPaymentCommand {
        RecordPaymentCommand {
            amount,
            date: date(2024, 3, 10),
            method: PaymentMethod::BankTransfer,
            reference: None,
        }
    }

    #[test]
    fn test_derivation_examples() {
        let (future, past, today) = (date(2024, 4, 30), date(2024, 2, 1), date(2024, 3, 15));
        let sent = InvoiceStatus::Sent;
        assert_eq!(derive_status(sent, &inputs(dec!(0), future, today)), InvoiceStatus::Sent);
        assert_eq!(derive_status(sent, &inputs(dec!(1000), future, today)), InvoiceStatus::Paid);
        assert_eq!(derive_status(sent, &inputs(dec!(400), past, today)), InvoiceStatus::PartiallyPaid);
        assert_eq!(derive_status(sent, &inputs(dec!(0), past, today)), InvoiceStatus::Overdue);
    }

    #[test]
    fn test_derivation_keeps_absorbing_and_draft() {
        let today = date(2024, 3, 15);
        let mut draft = inputs(dec!(0), date(2024, 1, 1), today);
        draft.ever_sent = false;
        assert_eq!(derive_status(InvoiceStatus::Draft, &draft), InvoiceStatus::Draft);
        assert_eq!(
            derive_status(InvoiceStatus::Voided, &inputs(dec!(1000), today, today)),
            InvoiceStatus::Voided
        );
    }

    #[test]
    fn test_due_date_today_is_not_overdue() {
        let today = date(2024, 3, 15);
        assert_eq!(
            derive_status(InvoiceStatus::Sent, &inputs(dec!(0), today, today)),
            InvoiceStatus::Sent
        );
    }

    #[test]
    fn test_payments_drive_status() {
        let mut invoice = sent_invoice();
        assert_eq!(invoice.totals.total_ttc.amount(), dec!(1200));

        let first = invoice.record_payment(&pay(dec!(400)), date(2024, 3, 10)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);

        invoice.record_payment(&pay(dec!(800)), date(2024, 3, 11)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.record_payment(&pay(dec!(1)), date(2024, 3, 12)).is_err());

        let reversal = ReversePaymentCommand {
            payment_id: first.id,
            reason: "Chèque impayé".into(),
            date: date(2024, 3, 20),
        };
        invoice.reverse_payment(&reversal, date(2024, 3, 20)).unwrap();
        assert_eq!(invoice.amount_paid.amount(), dec!(800));
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert!(invoice.reverse_payment(&reversal, date(2024, 3, 20)).is_err());
    }

    #[test]
    fn test_overpayment_rejected() {
        let mut invoice = sent_invoice();
        assert!(invoice.record_payment(&pay(dec!(1200.01)), date(2024, 3, 10)).is_err());
        assert!(invoice.payments.is_empty());
    }

    #[test]
    fn test_reversal_reverts_to_overdue() {
        let mut invoice = sent_invoice();
        let payment = invoice.record_payment(&pay(dec!(1200)), date(2024, 3, 10)).unwrap();
        let reversal = ReversePaymentCommand {
            payment_id: payment.id,
            reason: "Rejet".into(),
            date: date(2024, 4, 5),
        };
        invoice.reverse_payment(&reversal, date(2024, 4, 5)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
        assert!(invoice.amount_paid.is_zero());
    }

    #[test]
    fn test_viewed_kept_until_overdue() {
        let mut invoice = sent_invoice();
        invoice.mark_viewed(date(2024, 3, 2)).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::ViewedByClient);
        assert!(!invoice.refresh_overdue(date(2024, 3, 20)));
        assert!(invoice.refresh_overdue(date(2024, 4, 1)));
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn test_cancel_and_void_are_absorbing() {
        let admin = Actor::new(UserId::new(), Role::Admin);
        let sales = Actor::new(UserId::new(), Role::Sales);

        let mut invoice = sent_invoice();
        invoice.cancel(&sales, "Erreur de saisie").unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        assert!(!invoice.refresh_overdue(date(2025, 1, 1)));
        assert!(invoice.record_payment(&pay(dec!(10)), date(2024, 3, 10)).is_err());

        let mut paid = sent_invoice();
        paid.record_payment(&pay(dec!(100)), date(2024, 3, 10)).unwrap();
        assert!(paid.cancel(&admin, "x").is_err());
        assert!(matches!(paid.void(&sales, "x"), Err(CommerceError::Forbidden(_))));
        paid.void(&admin, "Litige").unwrap();
        assert_eq!(paid.status, InvoiceStatus::Voided);
    }
}
