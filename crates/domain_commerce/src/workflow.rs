//! Document workflow
//!
//! Application service driving quotes, invoices and delivery notes through
//! their lifecycles. Each step:
//!
//! 1. loads the document and checks the actor's permission
//! 2. mutates the aggregate (pure state machine code)
//! 3. prepares its side effects; ledger postings are resolved against the
//!    chart here, so a missing account aborts before anything is written
//! 4. commits the document(s) and outbox messages in one atomic call
//! 5. dispatches the new messages inline; failures stay pending for
//!    [`DocumentWorkflow::process_outbox`]
//!
//! Stock is the exception: it moves before the delivery note is committed,
//! because the negative-stock policy must be able to refuse the transition.
//! A failed commit compensates the movements.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{
    business_today, Actor, Currency, DeliveryNoteId, DocumentKind, DomainNotification, InvoiceId,
    NotificationPort, Permission, QuoteId, SupplierId,
};
use domain_accounting::{
    AccountingService, DocumentRef, DocumentType, JournalEntry, ManualJournalEntryCommand, PaymentEvent,
    PurchaseEvent, SaleEvent, TransactionType,
};
use domain_inventory::{MovementReason, StockChange, StockLedger, StockRequest};

use crate::commands::{
    CloseInvoiceCommand, ConvertToInvoiceCommand, CreateDeliveryNoteCommand, CreateInvoiceCommand,
    CreateQuoteCommand, DeliveryTransitionCommand, PurchaseCommand, RecordPaymentCommand, ReversePaymentCommand,
};
use crate::conversion;
use crate::delivery::{DeliveryItem, DeliveryNote, StockEffect};
use crate::error::CommerceError;
use crate::invoice::{Invoice, InvoiceOrigin, InvoiceStatus};
use crate::outbox::{OutboxCommand, OutboxMessage, OutboxReport, OutboxSettings};
use crate::ports::{ChangeSet, DocumentPort, OutboxPort};
use crate::pricing::{compute_document_totals, LineItem};
use crate::quote::{Quote, QuoteConversion, QuoteStatus};

/// Idempotency key of the sale entry of an invoice
pub fn sale_key(invoice_id: InvoiceId) -> String {
    format!("sale:{invoice_id}")
}

/// Document reference of a supplier invoice
///
/// Derived from the supplier and its invoice number, so a purchase booked
/// twice always points at the same document.
pub fn purchase_document(supplier_id: SupplierId, reference: &str) -> DocumentRef {
    DocumentRef::new(
        DocumentType::Purchase,
        Uuid::new_v5(supplier_id.as_uuid(), reference.as_bytes()),
    )
}

/// Idempotency key of the ledger entry of a payment
pub fn payment_key(payment_id: core_kernel::PaymentId) -> String {
    format!("payment:{payment_id}")
}

pub struct DocumentWorkflow {
    documents: Arc<dyn DocumentPort>,
    outbox: Arc<dyn OutboxPort>,
    sequences: core_kernel::SequenceGenerator,
    accounting: AccountingService,
    stock: StockLedger,
    notifier: Arc<dyn NotificationPort>,
    settings: OutboxSettings,
    currency: Currency,
    today: fn() -> NaiveDate,
}

impl DocumentWorkflow {
    pub fn new(
        documents: Arc<dyn DocumentPort>,
        outbox: Arc<dyn OutboxPort>,
        sequences: core_kernel::SequenceGenerator,
        accounting: AccountingService,
        stock: StockLedger,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            documents,
            outbox,
            sequences,
            accounting,
            stock,
            notifier,
            settings: OutboxSettings::default(),
            currency: Currency::EUR,
            today: business_today,
        }
    }

    pub fn with_settings(mut self, settings: OutboxSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Overrides the business calendar used for status derivation
    pub fn with_calendar(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn accounting(&self) -> &AccountingService {
        &self.accounting
    }

    pub fn stock(&self) -> &StockLedger {
        &self.stock
    }

    // ------------------------------------------------------------------
    // Quotes
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, actor, command), fields(client = %command.client.name))]
    pub async fn create_quote(&self, actor: &Actor, command: CreateQuoteCommand) -> Result<Quote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let mut quote = Quote::new(
            String::new(),
            command.client,
            command.items,
            self.currency,
            command.issue_date,
            command.valid_until,
        )?;
        quote.notes = command.notes;
        quote.number = self.sequences.next_for(DocumentKind::Quote, quote.issue_date).await?;

        self.commit(ChangeSet::new().quote(&quote, 0)).await?;
        tracing::info!(quote = %quote.number, total_ttc = %quote.totals.total_ttc, "Quote created");
        Ok(quote)
    }

    #[tracing::instrument(skip(self, actor, items))]
    pub async fn update_quote_items(
        &self,
        actor: &Actor,
        id: QuoteId,
        items: Vec<LineItem>,
    ) -> Result<Quote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut quote = self.load_quote(id).await?;
        let expected = quote.version;
        quote.replace_items(actor, items)?;
        self.commit(ChangeSet::new().quote(&quote, expected)).await?;
        Ok(quote)
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn send_quote(&self, actor: &Actor, id: QuoteId) -> Result<Quote, CommerceError> {
        self.change_quote(actor, id, |quote, _| quote.send()).await
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn accept_quote(&self, actor: &Actor, id: QuoteId) -> Result<Quote, CommerceError> {
        self.change_quote(actor, id, |quote, today| quote.accept(today)).await
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn reject_quote(&self, actor: &Actor, id: QuoteId) -> Result<Quote, CommerceError> {
        self.change_quote(actor, id, |quote, _| quote.reject()).await
    }

    /// Moves every SENT quote past its validity to EXPIRED
    ///
    /// Quotes modified concurrently are skipped and picked up by the next run.
    #[tracing::instrument(skip(self))]
    pub async fn expire_due_quotes(&self, today: NaiveDate) -> Result<Vec<Quote>, CommerceError> {
        let mut expired = Vec::new();
        for mut quote in self.documents.quotes_with_status(QuoteStatus::Sent).await? {
            let expected = quote.version;
            if !quote.expire_if_due(today) {
                continue;
            }
            match self.commit(ChangeSet::new().quote(&quote, expected)).await {
                Ok(()) => {
                    tracing::info!(quote = %quote.number, "Quote expired");
                    expired.push(quote);
                }
                Err(e) => tracing::warn!(quote = %quote.number, error = %e, "Could not expire quote"),
            }
        }
        Ok(expired)
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn delete_quote(&self, actor: &Actor, id: QuoteId) -> Result<(), CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let quote = self.load_quote(id).await?;
        quote.ensure_deletable()?;
        self.documents.delete_quote(id, quote.version).await?;
        tracing::info!(quote = %quote.number, "Quote deleted");
        Ok(())
    }

    /// Converts an ACCEPTED quote into a DRAFT invoice
    #[tracing::instrument(skip(self, actor, command))]
    pub async fn convert_quote_to_invoice(
        &self,
        actor: &Actor,
        id: QuoteId,
        command: ConvertToInvoiceCommand,
    ) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut quote = self.load_quote(id).await?;
        let expected = quote.version;

        let mut invoice = conversion::invoice_from_quote(&quote, &command)?;
        invoice.number = self.sequences.next_for(DocumentKind::Invoice, invoice.issue_date).await?;
        conversion::link_quote(
            &mut quote,
            QuoteConversion::Invoice {
                invoice_id: invoice.id,
                number: invoice.number.clone(),
            },
        )?;

        self.commit(ChangeSet::new().quote(&quote, expected).invoice(&invoice, 0))
            .await?;
        tracing::info!(quote = %quote.number, invoice = %invoice.number, "Quote converted to invoice");
        Ok(invoice)
    }

    /// Converts an ACCEPTED quote into a delivery note awaiting preparation
    #[tracing::instrument(skip(self, actor))]
    pub async fn convert_quote_to_delivery_note(
        &self,
        actor: &Actor,
        id: QuoteId,
        planned_date: Option<NaiveDate>,
    ) -> Result<DeliveryNote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut quote = self.load_quote(id).await?;
        let expected = quote.version;

        let mut note = conversion::delivery_note_from_quote(&quote, planned_date)?;
        note.number = self
            .sequences
            .next_for(DocumentKind::DeliveryNote, (self.today)())
            .await?;
        conversion::link_quote(
            &mut quote,
            QuoteConversion::DeliveryNote {
                delivery_note_id: note.id,
                number: note.number.clone(),
            },
        )?;

        self.commit(ChangeSet::new().quote(&quote, expected).delivery_note(&note, 0))
            .await?;
        tracing::info!(quote = %quote.number, delivery_note = %note.number, "Quote converted to delivery note");
        Ok(note)
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, actor, command), fields(client = %command.client.name))]
    pub async fn create_invoice(&self, actor: &Actor, command: CreateInvoiceCommand) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let mut invoice = Invoice::new(
            String::new(),
            command.client,
            command.items,
            self.currency,
            command.issue_date,
            command.due_date,
            InvoiceOrigin::Direct,
        )?;
        invoice.number = self.sequences.next_for(DocumentKind::Invoice, invoice.issue_date).await?;

        self.commit(ChangeSet::new().invoice(&invoice, 0)).await?;
        tracing::info!(invoice = %invoice.number, total_ttc = %invoice.totals.total_ttc, "Invoice created");
        Ok(invoice)
    }

    #[tracing::instrument(skip(self, actor, items))]
    pub async fn update_invoice_items(
        &self,
        actor: &Actor,
        id: InvoiceId,
        items: Vec<LineItem>,
    ) -> Result<Invoice, CommerceError> {
        self.change_invoice(actor, id, |invoice, _| invoice.replace_items(items)).await
    }

    /// DRAFT -> SENT; books the sale
    #[tracing::instrument(skip(self, actor))]
    pub async fn send_invoice(&self, actor: &Actor, id: InvoiceId) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut invoice = self.load_invoice(id).await?;
        let expected = invoice.version;
        invoice.mark_sent((self.today)())?;

        let sale = SaleEvent {
            document: invoice_ref(&invoice),
            document_number: invoice.number.clone(),
            client_name: invoice.client.name.clone(),
            date: invoice.issue_date,
            total_ht: invoice.totals.total_ht,
            total_vat: invoice.totals.total_vat,
            total_ttc: invoice.totals.total_ttc,
            services_ht: invoice.services_ht()?,
        };
        let entry = self
            .accounting
            .prepare_sale(&sale)
            .await?
            .with_idempotency_key(sale_key(invoice.id));

        self.commit(
            ChangeSet::new()
                .invoice(&invoice, expected)
                .messages([OutboxMessage::post(entry)]),
        )
        .await?;
        tracing::info!(invoice = %invoice.number, status = %invoice.status, "Invoice sent");
        Ok(invoice)
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn mark_invoice_viewed(&self, actor: &Actor, id: InvoiceId) -> Result<Invoice, CommerceError> {
        self.change_invoice(actor, id, |invoice, today| invoice.mark_viewed(today)).await
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn set_invoice_due_date(
        &self,
        actor: &Actor,
        id: InvoiceId,
        due_date: Option<NaiveDate>,
    ) -> Result<Invoice, CommerceError> {
        self.change_invoice(actor, id, |invoice, today| invoice.set_due_date(due_date, today))
            .await
    }

    /// Records a payment, books it and notifies
    #[tracing::instrument(skip(self, actor, command), fields(amount = %command.amount))]
    pub async fn record_payment(
        &self,
        actor: &Actor,
        id: InvoiceId,
        command: RecordPaymentCommand,
    ) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let mut invoice = self.load_invoice(id).await?;
        let expected = invoice.version;
        let payment = invoice.record_payment(&command, (self.today)())?;

        let event = PaymentEvent {
            document: invoice_ref(&invoice),
            document_number: invoice.number.clone(),
            client_name: invoice.client.name.clone(),
            date: payment.date,
            amount: payment.amount,
            channel: payment.method.channel(),
        };
        let entry = self
            .accounting
            .prepare_payment_received(&event)
            .await?
            .with_idempotency_key(payment_key(payment.id));
        let notification = DomainNotification::PaymentReceived {
            invoice_id: invoice.id,
            invoice_number: invoice.number.clone(),
            amount: payment.amount.amount(),
            amount_paid: invoice.amount_paid.amount(),
        };

        self.commit(
            ChangeSet::new()
                .invoice(&invoice, expected)
                .messages([OutboxMessage::post(entry), OutboxMessage::notify(notification)]),
        )
        .await?;
        tracing::info!(
            invoice = %invoice.number,
            amount = %payment.amount,
            status = %invoice.status,
            "Payment recorded"
        );
        Ok(invoice)
    }

    /// Cancels a payment and reverses its ledger entry
    #[tracing::instrument(skip(self, actor, command), fields(payment_id = %command.payment_id))]
    pub async fn reverse_payment(
        &self,
        actor: &Actor,
        id: InvoiceId,
        command: ReversePaymentCommand,
    ) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let mut invoice = self.load_invoice(id).await?;
        let expected = invoice.version;
        invoice.reverse_payment(&command, (self.today)())?;

        let message = OutboxMessage::new(OutboxCommand::ReverseEntryByKey {
            key: payment_key(command.payment_id),
            reason: command.reason.clone(),
            date: command.date,
        });
        self.commit(ChangeSet::new().invoice(&invoice, expected).messages([message]))
            .await?;
        tracing::info!(invoice = %invoice.number, status = %invoice.status, "Payment reversed");
        Ok(invoice)
    }

    /// Cancels an unpaid invoice; a sent one gets its sale reversed
    #[tracing::instrument(skip(self, actor, command))]
    pub async fn cancel_invoice(
        &self,
        actor: &Actor,
        id: InvoiceId,
        command: CloseInvoiceCommand,
    ) -> Result<Invoice, CommerceError> {
        self.close_invoice(actor, id, command, |invoice, actor, reason| invoice.cancel(actor, reason))
            .await
    }

    /// Voids an invoice; a sent one gets its sale reversed
    #[tracing::instrument(skip(self, actor, command))]
    pub async fn void_invoice(
        &self,
        actor: &Actor,
        id: InvoiceId,
        command: CloseInvoiceCommand,
    ) -> Result<Invoice, CommerceError> {
        self.close_invoice(actor, id, command, |invoice, actor, reason| invoice.void(actor, reason))
            .await
    }

    /// Re-derives the status of every open invoice for `today`
    #[tracing::instrument(skip(self))]
    pub async fn refresh_overdue_invoices(&self, today: NaiveDate) -> Result<Vec<Invoice>, CommerceError> {
        let open = [
            InvoiceStatus::Sent,
            InvoiceStatus::ViewedByClient,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Overdue,
        ];
        let mut changed = Vec::new();
        for mut invoice in self.documents.invoices_with_status(&open).await? {
            let expected = invoice.version;
            if !invoice.refresh_overdue(today) {
                continue;
            }
            match self.commit(ChangeSet::new().invoice(&invoice, expected)).await {
                Ok(()) => changed.push(invoice),
                Err(e) => tracing::warn!(invoice = %invoice.number, error = %e, "Could not refresh invoice"),
            }
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Delivery notes
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, actor, command), fields(client = %command.client.name))]
    pub async fn create_delivery_note(
        &self,
        actor: &Actor,
        command: CreateDeliveryNoteCommand,
    ) -> Result<DeliveryNote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let items = command.items.into_iter().map(DeliveryItem::new).collect();
        let mut note = DeliveryNote::new(
            String::new(),
            command.client,
            items,
            command.delivery_address,
            command.planned_date,
        )?;
        note.number = self
            .sequences
            .next_for(DocumentKind::DeliveryNote, (self.today)())
            .await?;

        self.commit(ChangeSet::new().delivery_note(&note, 0)).await?;
        tracing::info!(delivery_note = %note.number, "Delivery note created");
        Ok(note)
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn set_delivered_quantity(
        &self,
        actor: &Actor,
        id: DeliveryNoteId,
        line: usize,
        quantity: Decimal,
    ) -> Result<DeliveryNote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut note = self.load_delivery_note(id).await?;
        let expected = note.version;
        note.set_delivered_quantity(line, quantity)?;
        self.commit(ChangeSet::new().delivery_note(&note, expected)).await?;
        Ok(note)
    }

    /// Moves a delivery note and its stock
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` for an edge the state machine does not have
    /// - `Inventory(InsufficientStock)` when the reject policy refuses a
    ///   decrement; no stock moves and the note keeps its status
    #[tracing::instrument(skip(self, actor, command), fields(target = %command.target))]
    pub async fn transition_delivery_note(
        &self,
        actor: &Actor,
        id: DeliveryNoteId,
        command: DeliveryTransitionCommand,
    ) -> Result<DeliveryNote, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut note = self.load_delivery_note(id).await?;
        let expected = note.version;
        let from = note.status;
        let effect = note.transition(command.target, command.shipping)?;

        let requests = stock_requests(&note, effect);
        let changes = self.stock.apply_all(&requests).await?;
        let messages: Vec<OutboxMessage> = changes
            .iter()
            .filter(|c| c.applied)
            .flat_map(StockChange::notifications)
            .map(OutboxMessage::notify)
            .collect();

        if let Err(e) = self
            .commit(ChangeSet::new().delivery_note(&note, expected).messages(messages))
            .await
        {
            tracing::warn!(delivery_note = %note.number, error = %e, "Commit failed, reverting stock");
            self.stock.compensate(&changes).await;
            return Err(e);
        }
        tracing::info!(
            delivery_note = %note.number,
            from = %from,
            to = %note.status,
            movements = changes.len(),
            "Delivery note transitioned"
        );
        Ok(note)
    }

    /// Invoices the delivered quantities of a dispatched note
    #[tracing::instrument(skip(self, actor, command))]
    pub async fn convert_delivery_note_to_invoice(
        &self,
        actor: &Actor,
        id: DeliveryNoteId,
        command: ConvertToInvoiceCommand,
    ) -> Result<Invoice, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        let mut note = self.load_delivery_note(id).await?;
        let expected = note.version;

        let mut invoice = conversion::invoice_from_delivery_note(&note, &command)?;
        invoice.number = self.sequences.next_for(DocumentKind::Invoice, invoice.issue_date).await?;
        conversion::link_delivery_note(&mut note, &invoice)?;

        self.commit(ChangeSet::new().delivery_note(&note, expected).invoice(&invoice, 0))
            .await?;
        tracing::info!(delivery_note = %note.number, invoice = %invoice.number, "Delivery note invoiced");
        Ok(invoice)
    }

    // ------------------------------------------------------------------
    // Direct postings
    // ------------------------------------------------------------------

    /// Books a supplier invoice
    ///
    /// The same supplier reference is booked only once.
    #[tracing::instrument(skip(self, actor, command), fields(reference = %command.reference))]
    pub async fn record_purchase(&self, actor: &Actor, command: PurchaseCommand) -> Result<JournalEntry, CommerceError> {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let totals = compute_document_totals(&command.items, self.currency)?;
        let event = PurchaseEvent {
            document: purchase_document(command.supplier.supplier_id, &command.reference),
            reference: command.reference.clone(),
            supplier_name: command.supplier.name.clone(),
            date: command.date,
            total_ht: totals.total_ht,
            total_vat: totals.total_vat,
            total_ttc: totals.total_ttc,
            expense_account: command.expense_account.clone(),
        };
        let key = format!("purchase:{}:{}", command.supplier.supplier_id, command.reference);
        let entry = self.accounting.prepare_purchase(&event).await?.with_idempotency_key(key);
        let entry = self.accounting.ledger().append(entry).await?;
        tracing::info!(entry = %entry.number, total_ttc = %totals.total_ttc, "Purchase booked");
        Ok(entry)
    }

    /// Books a manual entry; requires `ManualJournal`
    #[tracing::instrument(skip(self, actor, command), fields(user = %actor.user_id))]
    pub async fn record_manual_entry(
        &self,
        actor: &Actor,
        command: &ManualJournalEntryCommand,
    ) -> Result<JournalEntry, CommerceError> {
        Ok(self.accounting.record_manual(actor, command).await?)
    }

    // ------------------------------------------------------------------
    // Outbox
    // ------------------------------------------------------------------

    /// Retries pending side effects, oldest first
    #[tracing::instrument(skip(self))]
    pub async fn process_outbox(&self) -> Result<OutboxReport, CommerceError> {
        let pending = self.outbox.pending(self.settings.batch_size).await?;
        let mut report = OutboxReport::default();
        for message in &pending {
            let result = self.dispatch(message).await;
            match self.settle(message, result).await {
                Settled::Dispatched => report.dispatched += 1,
                Settled::Failed => report.failed += 1,
                Settled::Dead => report.dead += 1,
            }
        }
        if !pending.is_empty() {
            tracing::info!(
                dispatched = report.dispatched,
                failed = report.failed,
                dead = report.dead,
                "Outbox processed"
            );
        }
        Ok(report)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), CommerceError> {
        self.documents.commit(&changes).await?;
        for message in &changes.messages {
            let result = self.dispatch(message).await;
            if self.settle(message, result).await != Settled::Dispatched {
                // later messages may depend on this one
                break;
            }
        }
        Ok(())
    }

    async fn dispatch(&self, message: &OutboxMessage) -> Result<(), CommerceError> {
        let ledger = self.accounting.ledger();
        match &message.command {
            OutboxCommand::PostJournalEntry { entry } => {
                let posted = ledger.append(entry.clone()).await?;
                tracing::debug!(entry = %posted.number, "Entry posted");
            }
            OutboxCommand::ReverseDocumentEntries {
                document,
                transaction_type,
                reason,
                date,
            } => {
                let reversals = ledger
                    .reverse_related(*document, *transaction_type, reason, *date)
                    .await?;
                if reversals.is_empty() {
                    let posted = ledger.entries_for(*document).await?;
                    if !posted.iter().any(|e| e.transaction_type == *transaction_type) {
                        return Err(CommerceError::validation(format!(
                            "no {} entry posted yet for the document",
                            transaction_type.as_str()
                        )));
                    }
                }
            }
            OutboxCommand::ReverseEntryByKey { key, reason, date } => {
                ledger.reverse_by_key(key, reason, *date).await?;
            }
            OutboxCommand::Notify { notification } => {
                if let Err(e) = self.notifier.publish(notification).await {
                    tracing::warn!(event = notification.event_name(), error = %e, "Notification failed");
                }
            }
        }
        Ok(())
    }

    async fn settle(&self, message: &OutboxMessage, result: Result<(), CommerceError>) -> Settled {
        match result {
            Ok(()) => {
                if let Err(e) = self.outbox.mark_dispatched(message.id).await {
                    tracing::error!(message_id = %message.id, error = %e, "Could not mark message dispatched");
                }
                Settled::Dispatched
            }
            Err(error) => {
                let attempts = message.attempts + 1;
                let dead = attempts >= self.settings.max_attempts;
                if dead {
                    tracing::error!(
                        message_id = %message.id,
                        command = message.command.name(),
                        attempts,
                        error = %error,
                        "Outbox message abandoned"
                    );
                } else {
                    tracing::warn!(
                        message_id = %message.id,
                        command = message.command.name(),
                        attempts,
                        error = %error,
                        "Outbox message failed, will retry"
                    );
                }
                if let Err(e) = self.outbox.record_failure(message.id, &error.to_string(), dead).await {
                    tracing::error!(message_id = %message.id, error = %e, "Could not record outbox failure");
                }
                if dead {
                    Settled::Dead
                } else {
                    Settled::Failed
                }
            }
        }
    }

    async fn close_invoice<F>(
        &self,
        actor: &Actor,
        id: InvoiceId,
        command: CloseInvoiceCommand,
        close: F,
    ) -> Result<Invoice, CommerceError>
    where
        F: FnOnce(&mut Invoice, &Actor, &str) -> Result<(), CommerceError>,
    {
        actor.ensure(Permission::ManageDocuments)?;
        command.validate()?;
        let mut invoice = self.load_invoice(id).await?;
        let expected = invoice.version;
        close(&mut invoice, actor, &command.reason)?;

        let mut changes = ChangeSet::new().invoice(&invoice, expected);
        if invoice.was_sent() {
            changes = changes.messages([OutboxMessage::new(OutboxCommand::ReverseDocumentEntries {
                document: invoice_ref(&invoice),
                transaction_type: TransactionType::Sale,
                reason: command.reason.clone(),
                date: command.date,
            })]);
        }
        self.commit(changes).await?;
        tracing::info!(invoice = %invoice.number, status = %invoice.status, reason = %command.reason, "Invoice closed");
        Ok(invoice)
    }

    async fn change_quote<F>(&self, actor: &Actor, id: QuoteId, change: F) -> Result<Quote, CommerceError>
    where
        F: FnOnce(&mut Quote, NaiveDate) -> Result<(), CommerceError>,
    {
        actor.ensure(Permission::ManageDocuments)?;
        let mut quote = self.load_quote(id).await?;
        let expected = quote.version;
        change(&mut quote, (self.today)())?;
        self.commit(ChangeSet::new().quote(&quote, expected)).await?;
        tracing::info!(quote = %quote.number, status = %quote.status, "Quote updated");
        Ok(quote)
    }

    async fn change_invoice<F>(&self, actor: &Actor, id: InvoiceId, change: F) -> Result<Invoice, CommerceError>
    where
        F: FnOnce(&mut Invoice, NaiveDate) -> Result<(), CommerceError>,
    {
        actor.ensure(Permission::ManageDocuments)?;
        let mut invoice = self.load_invoice(id).await?;
        let expected = invoice.version;
        change(&mut invoice, (self.today)())?;
        self.commit(ChangeSet::new().invoice(&invoice, expected)).await?;
        Ok(invoice)
    }

    pub async fn load_quote(&self, id: QuoteId) -> Result<Quote, CommerceError> {
        self.documents
            .get_quote(id)
            .await?
            .ok_or_else(|| CommerceError::QuoteNotFound(id.to_string()))
    }

    pub async fn load_invoice(&self, id: InvoiceId) -> Result<Invoice, CommerceError> {
        self.documents
            .get_invoice(id)
            .await?
            .ok_or_else(|| CommerceError::InvoiceNotFound(id.to_string()))
    }

    pub async fn load_delivery_note(&self, id: DeliveryNoteId) -> Result<DeliveryNote, CommerceError> {
        self.documents
            .get_delivery_note(id)
            .await?
            .ok_or_else(|| CommerceError::DeliveryNoteNotFound(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Dispatched,
    Failed,
    Dead,
}

fn invoice_ref(invoice: &Invoice) -> DocumentRef {
    DocumentRef::new(DocumentType::Invoice, invoice.id)
}

/// Stock movements implied by a delivery-note transition
///
/// Keys are unique per attempt; the note's version check guarantees a
/// transition is committed at most once.
fn stock_requests(note: &DeliveryNote, effect: StockEffect) -> Vec<StockRequest> {
    let (sign, reason, tag) = match effect {
        StockEffect::None => return Vec::new(),
        StockEffect::Decrement => (Decimal::NEGATIVE_ONE, MovementReason::Delivery, "dispatch"),
        StockEffect::Restore => (Decimal::ONE, MovementReason::Return, "return"),
    };
    let attempt = Uuid::now_v7();
    note.items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.line.is_service)
        .filter_map(|(index, item)| {
            let product_id = item.line.product_id?;
            let key = format!("{}:{tag}:{index}:{attempt}", note.id);
            Some(
                StockRequest::new(product_id, sign * item.quantity_delivered, reason, key)
                    .with_source(note.number.clone()),
            )
        })
        .collect()
}
