//! Document Workflow Integration Tests
//!
//! Drives the full service graph over in-memory stores.
//!
//! - `quotes` - numbering, acceptance, expiry, deletion and conversion
//! - `invoices` - sending, payments, closure and overdue refresh
//! - `delivery` - stock movements and delivery-note invoicing
//! - `purchases` - supplier invoices booked once per reference
//! - `outbox` - deferred postings, retries and dead letters
//! - `properties` - totals and status derivation

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{DomainNotification, Role, SupplierId};
use domain_accounting::TransactionType;
use domain_commerce::{
    CloseInvoiceCommand, CommerceError, DeliveryStatus, DeliveryTransitionCommand, Invoice, InvoiceOrigin,
    InvoiceStatus, LineItem, OutboxSettings, PurchaseCommand, QuoteStatus, ReversePaymentCommand,
};
use domain_inventory::InventoryError;
use test_utils::{
    assert_entry_balanced, assert_entry_moves, date, payment, CommerceFixtures, DocumentCommandBuilder, IdFixtures,
    TemporalFixtures, TestHarness,
};

fn close(reason: &str) -> CloseInvoiceCommand {
    CloseInvoiceCommand {
        reason: reason.into(),
        date: TemporalFixtures::today(),
    }
}

async fn sent_invoice(h: &TestHarness) -> Invoice {
    let invoice = h
        .workflow
        .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
        .await
        .unwrap();
    h.workflow.send_invoice(&h.admin, invoice.id).await.unwrap()
}

mod quotes {
    use super::*;

    #[tokio::test]
    async fn test_quote_numbering_and_totals() {
        let h = TestHarness::new().await;
        let first = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        let second = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();

        assert_eq!(first.number, "DEV24000001");
        assert_eq!(second.number, "DEV24000002");
        assert_eq!(first.status, QuoteStatus::Draft);
        assert_eq!(first.totals.total_ht.amount(), dec!(1000));
        assert_eq!(first.totals.total_vat.amount(), dec!(200));
        assert_eq!(first.totals.total_ttc.amount(), dec!(1200));
    }

    #[tokio::test]
    async fn test_viewer_cannot_create_quotes() {
        let h = TestHarness::new().await;
        let viewer = h.actor(Role::Viewer);
        let result = h
            .workflow
            .create_quote(&viewer, DocumentCommandBuilder::new().quote())
            .await;
        assert!(matches!(result, Err(CommerceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_accepted_quote_converts_once() {
        let h = TestHarness::new().await;
        let quote = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        h.workflow.send_quote(&h.admin, quote.id).await.unwrap();
        let accepted = h.workflow.accept_quote(&h.admin, quote.id).await.unwrap();
        assert_eq!(accepted.status, QuoteStatus::Accepted);

        let conversion = DocumentCommandBuilder::new().with_issue_date(TemporalFixtures::today()).conversion();
        let invoice = h
            .workflow
            .convert_quote_to_invoice(&h.admin, quote.id, conversion.clone())
            .await
            .unwrap();

        assert_eq!(invoice.number, "FAC24000001");
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.totals, accepted.totals);
        assert!(matches!(
            &invoice.origin,
            InvoiceOrigin::Quote { quote_id, number } if *quote_id == quote.id && number == "DEV24000001"
        ));

        let stored = h.workflow.load_quote(quote.id).await.unwrap();
        assert_eq!(stored.status, QuoteStatus::ConvertedToInvoice);

        let again = h.workflow.convert_quote_to_invoice(&h.admin, quote.id, conversion).await;
        assert!(matches!(again, Err(CommerceError::AlreadyConverted(_))));
        let to_note = h
            .workflow
            .convert_quote_to_delivery_note(&h.admin, quote.id, None)
            .await;
        assert!(matches!(to_note, Err(CommerceError::AlreadyConverted(_))));
    }

    #[tokio::test]
    async fn test_quote_converts_to_delivery_note() {
        let h = TestHarness::new().await;
        let quote = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        h.workflow.send_quote(&h.admin, quote.id).await.unwrap();
        h.workflow.accept_quote(&h.admin, quote.id).await.unwrap();

        let note = h
            .workflow
            .convert_quote_to_delivery_note(&h.admin, quote.id, Some(date(2024, 3, 20)))
            .await
            .unwrap();

        assert_eq!(note.number, "BL24000001");
        assert_eq!(note.status, DeliveryStatus::PendingPreparation);
        assert_eq!(note.items.len(), 1);
        assert_eq!(note.items[0].quantity_delivered, dec!(10));
        let stored = h.workflow.load_quote(quote.id).await.unwrap();
        assert_eq!(stored.status, QuoteStatus::ConvertedToDelivery);
    }

    #[tokio::test]
    async fn test_unaccepted_quote_does_not_convert() {
        let h = TestHarness::new().await;
        let quote = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        let result = h
            .workflow
            .convert_quote_to_invoice(&h.admin, quote.id, DocumentCommandBuilder::new().conversion())
            .await;
        assert!(matches!(result, Err(CommerceError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_due_quotes_expire() {
        let h = TestHarness::new().await;
        let short = h
            .workflow
            .create_quote(
                &h.admin,
                DocumentCommandBuilder::new().with_valid_until(date(2024, 3, 10)).quote(),
            )
            .await
            .unwrap();
        let long = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        h.workflow.send_quote(&h.admin, short.id).await.unwrap();
        h.workflow.send_quote(&h.admin, long.id).await.unwrap();

        let expired = h.workflow.expire_due_quotes(TemporalFixtures::today()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short.id);
        assert_eq!(expired[0].status, QuoteStatus::Expired);

        let accept = h.workflow.accept_quote(&h.admin, short.id).await;
        assert!(matches!(accept, Err(CommerceError::InvalidTransition { .. })));
        assert_eq!(
            h.workflow.load_quote(long.id).await.unwrap().status,
            QuoteStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_only_drafts_are_deleted() {
        let h = TestHarness::new().await;
        let draft = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        let sent = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        h.workflow.send_quote(&h.admin, sent.id).await.unwrap();

        h.workflow.delete_quote(&h.admin, draft.id).await.unwrap();
        assert!(matches!(
            h.workflow.load_quote(draft.id).await,
            Err(CommerceError::QuoteNotFound(_))
        ));

        let result = h.workflow.delete_quote(&h.admin, sent.id).await;
        assert!(result.is_err());
        assert!(h.workflow.load_quote(sent.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_draft_items_can_be_replaced() {
        let h = TestHarness::new().await;
        let quote = h
            .workflow
            .create_quote(&h.admin, DocumentCommandBuilder::new().quote())
            .await
            .unwrap();
        let items = vec![LineItem::from_product(&CommerceFixtures::installation(), dec!(2))];
        let updated = h.workflow.update_quote_items(&h.admin, quote.id, items).await.unwrap();

        assert_eq!(updated.totals.total_ht.amount(), dec!(100));
        assert_eq!(updated.totals.total_ttc.amount(), dec!(120));
        assert!(updated.version > quote.version);
    }
}

mod invoices {
    use super::*;

    #[tokio::test]
    async fn test_sending_books_the_sale() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        assert_eq!(invoice.status, InvoiceStatus::Sent);

        let entries = h.accounting_store.entries().await;
        assert_eq!(entries.len(), 1);
        let sale = &entries[0];
        assert_eq!(sale.transaction_type, TransactionType::Sale);
        assert_eq!(sale.idempotency_key.as_deref(), Some(domain_commerce::sale_key(invoice.id).as_str()));
        assert_entry_balanced(sale);
        assert_entry_moves(sale, "411000", dec!(1200));
        assert_entry_moves(sale, "707000", dec!(-1000));
        assert_entry_moves(sale, "445710", dec!(-200));
        assert_eq!(h.documents.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_services_only_invoice_books_service_revenue() {
        let h = TestHarness::new().await;
        let items = vec![LineItem::from_product(&CommerceFixtures::installation(), dec!(2))];
        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().with_items(items).invoice())
            .await
            .unwrap();
        h.workflow.send_invoice(&h.admin, invoice.id).await.unwrap();

        let entries = h.accounting_store.entries().await;
        assert_entry_moves(&entries[0], "706000", dec!(-100));
    }

    #[tokio::test]
    async fn test_mixed_invoice_splits_goods_and_service_revenue() {
        let h = TestHarness::new().await;
        let mut items = CommerceFixtures::ten_tables();
        items.push(LineItem::from_product(&CommerceFixtures::installation(), dec!(2)));
        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().with_items(items).invoice())
            .await
            .unwrap();
        h.workflow.send_invoice(&h.admin, invoice.id).await.unwrap();

        let sale = &h.accounting_store.entries().await[0];
        assert_entry_balanced(sale);
        assert_entry_moves(sale, "411000", dec!(1320));
        assert_entry_moves(sale, "707000", dec!(-1000));
        assert_entry_moves(sale, "706000", dec!(-100));
        assert_entry_moves(sale, "445710", dec!(-220));
    }

    #[tokio::test]
    async fn test_sending_past_due_goes_overdue() {
        let h = TestHarness::new().await;
        let invoice = h
            .workflow
            .create_invoice(
                &h.admin,
                DocumentCommandBuilder::new()
                    .with_due_date(Some(TemporalFixtures::past_due_date()))
                    .invoice(),
            )
            .await
            .unwrap();
        let sent = h.workflow.send_invoice(&h.admin, invoice.id).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Overdue);
    }

    #[tokio::test]
    async fn test_payments_drive_the_status() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;

        let partial = h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(500)))
            .await
            .unwrap();
        assert_eq!(partial.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(partial.amount_paid.amount(), dec!(500));

        let received = h.notifier.named("payment_received").await;
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0],
            DomainNotification::PaymentReceived { amount, amount_paid, .. }
                if *amount == dec!(500) && *amount_paid == dec!(500)
        ));

        let paid = h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(700)))
            .await
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);

        let entries = h.accounting_store.entries().await;
        let payments: Vec<_> = entries
            .iter()
            .filter(|e| e.transaction_type == TransactionType::PaymentReceived)
            .collect();
        assert_eq!(payments.len(), 2);
        assert_entry_moves(payments[0], "512000", dec!(500));
        assert_entry_moves(payments[0], "411000", dec!(-500));
    }

    #[tokio::test]
    async fn test_overpayment_is_refused() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;

        let result = h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(1200.01)))
            .await;
        assert!(matches!(result, Err(CommerceError::Validation(_))));
        assert_eq!(h.accounting_store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_draft_cannot_be_paid() {
        let h = TestHarness::new().await;
        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
            .await
            .unwrap();
        let result = h.workflow.record_payment(&h.admin, invoice.id, payment(dec!(100))).await;
        assert!(matches!(result, Err(CommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reversed_payment_reverses_its_entry() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        let partial = h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(500)))
            .await
            .unwrap();
        let payment_id = partial.payments[0].id;

        let command = ReversePaymentCommand {
            payment_id,
            reason: "Chèque rejeté".into(),
            date: TemporalFixtures::today(),
        };
        let reverted = h
            .workflow
            .reverse_payment(&h.admin, invoice.id, command.clone())
            .await
            .unwrap();
        assert_eq!(reverted.status, InvoiceStatus::Sent);
        assert!(reverted.amount_paid.is_zero());

        let entries = h.accounting_store.entries().await;
        assert_eq!(entries.len(), 3);
        let original = entries
            .iter()
            .find(|e| e.transaction_type == TransactionType::PaymentReceived && e.reverses.is_none())
            .unwrap();
        let reversal = entries.iter().find(|e| e.reverses == Some(original.id)).unwrap();
        assert_entry_moves(reversal, "512000", dec!(-500));
        assert_eq!(original.reversed_by, Some(reversal.id));

        let again = h.workflow.reverse_payment(&h.admin, invoice.id, command).await;
        assert!(matches!(again, Err(CommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancelling_a_sent_invoice_reverses_the_sale() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;

        let cancelled = h
            .workflow
            .cancel_invoice(&h.admin, invoice.id, close("Erreur de saisie"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

        let entries = h.accounting_store.entries().await;
        assert_eq!(entries.len(), 2);
        assert_entry_moves(&entries[1], "411000", dec!(-1200));
        assert_eq!(entries[1].reverses, Some(entries[0].id));
    }

    #[tokio::test]
    async fn test_cancelling_a_draft_books_nothing() {
        let h = TestHarness::new().await;
        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
            .await
            .unwrap();
        h.workflow
            .cancel_invoice(&h.admin, invoice.id, close("Doublon"))
            .await
            .unwrap();

        assert!(h.accounting_store.entries().await.is_empty());
        assert!(h.documents.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_paid_invoice_cannot_be_cancelled() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        h.workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(100)))
            .await
            .unwrap();

        let result = h.workflow.cancel_invoice(&h.admin, invoice.id, close("Annulation")).await;
        assert!(matches!(result, Err(CommerceError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_voiding_with_payments_needs_override() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        h.workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(1200)))
            .await
            .unwrap();

        let sales = h.actor(Role::Sales);
        let refused = h.workflow.void_invoice(&sales, invoice.id, close("Litige")).await;
        assert!(matches!(refused, Err(CommerceError::Forbidden(_))));

        let voided = h
            .workflow
            .void_invoice(&h.admin, invoice.id, close("Litige"))
            .await
            .unwrap();
        assert_eq!(voided.status, InvoiceStatus::Voided);
        assert_eq!(voided.closure.as_ref().map(|c| c.reason.as_str()), Some("Litige"));

        let entries = h.accounting_store.entries().await;
        let sale = entries
            .iter()
            .find(|e| e.transaction_type == TransactionType::Sale)
            .unwrap();
        let reversals: Vec<_> = entries
            .iter()
            .filter(|e| e.transaction_type == TransactionType::Reversal)
            .collect();
        assert_eq!(reversals.len(), 1);
        assert_eq!(reversals[0].reverses, Some(sale.id));
        let payment = entries
            .iter()
            .find(|e| e.transaction_type == TransactionType::PaymentReceived)
            .unwrap();
        assert!(payment.reversed_by.is_none());
    }

    #[tokio::test]
    async fn test_absorbing_states_are_final() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        h.workflow
            .cancel_invoice(&h.admin, invoice.id, close("Erreur"))
            .await
            .unwrap();

        assert!(h.workflow.void_invoice(&h.admin, invoice.id, close("Erreur")).await.is_err());
        assert!(h.workflow.mark_invoice_viewed(&h.admin, invoice.id).await.is_err());
        assert!(h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(10)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_refresh_marks_overdue_invoices() {
        let h = TestHarness::new().await;
        let late = sent_invoice(&h).await;
        let draft = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
            .await
            .unwrap();

        let unchanged = h.workflow.refresh_overdue_invoices(TemporalFixtures::today()).await.unwrap();
        assert!(unchanged.is_empty());

        let changed = h.workflow.refresh_overdue_invoices(date(2024, 4, 15)).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, late.id);
        assert_eq!(changed[0].status, InvoiceStatus::Overdue);
        assert_eq!(
            h.workflow.load_invoice(draft.id).await.unwrap().status,
            InvoiceStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_viewed_invoice() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        let viewed = h.workflow.mark_invoice_viewed(&h.admin, invoice.id).await.unwrap();
        assert_eq!(viewed.status, InvoiceStatus::ViewedByClient);
        assert!(viewed.viewed_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_invoice_consumes_no_number() {
        let h = TestHarness::new().await;
        let bad = vec![LineItem::from_product(&CommerceFixtures::table(), Decimal::ZERO)];
        let result = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().with_items(bad).invoice())
            .await;
        assert!(result.is_err());

        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
            .await
            .unwrap();
        assert_eq!(invoice.number, "FAC24000001");
    }

    #[tokio::test]
    async fn test_concurrent_sends_book_one_sale() {
        let h = TestHarness::new().await;
        let invoice = h
            .workflow
            .create_invoice(&h.admin, DocumentCommandBuilder::new().invoice())
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.workflow.send_invoice(&h.admin, invoice.id),
            h.workflow.send_invoice(&h.admin, invoice.id)
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let sales = h
            .accounting_store
            .entries()
            .await
            .into_iter()
            .filter(|e| e.transaction_type == TransactionType::Sale)
            .count();
        assert_eq!(sales, 1);
    }
}

mod delivery {
    use super::*;

    async fn note_for_five(h: &TestHarness) -> domain_commerce::DeliveryNote {
        let note = h
            .workflow
            .create_delivery_note(&h.admin, DocumentCommandBuilder::new().delivery_note())
            .await
            .unwrap();
        h.workflow
            .set_delivered_quantity(&h.admin, note.id, 0, dec!(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_shipping_decrements_and_alerts() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;
        assert_eq!(note.number, "BL24000001");

        let shipped = h
            .workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();

        assert_eq!(shipped.status, DeliveryStatus::Shipped);
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(7)));
        let alerts = h.notifier.named("low_stock_alert").await;
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            &alerts[0],
            DomainNotification::LowStock { quantity, threshold, .. }
                if *quantity == dec!(7) && *threshold == dec!(10)
        ));
        assert_eq!(h.notifier.named("stock_updated").await.len(), 1);
    }

    #[tokio::test]
    async fn test_return_restores_stock() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;
        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();
        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Delivered))
            .await
            .unwrap();
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(7)));

        let returned = h
            .workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Returned))
            .await
            .unwrap();
        assert_eq!(returned.status, DeliveryStatus::Returned);
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(12)));

        let back = h
            .workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await;
        assert!(matches!(back, Err(CommerceError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_insufficient_stock_blocks_shipping() {
        let h = TestHarness::new().await;
        let items = vec![LineItem::from_product(&CommerceFixtures::table(), dec!(15))];
        let note = h
            .workflow
            .create_delivery_note(&h.admin, DocumentCommandBuilder::new().with_items(items).delivery_note())
            .await
            .unwrap();

        let result = h
            .workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await;

        assert!(matches!(
            result,
            Err(CommerceError::Inventory(InventoryError::InsufficientStock { .. }))
        ));
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(12)));
        assert_eq!(
            h.workflow.load_delivery_note(note.id).await.unwrap().status,
            DeliveryStatus::PendingPreparation
        );
    }

    #[tokio::test]
    async fn test_failed_commit_reverts_stock() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;

        h.documents.set_fail_commits(true);
        let failed = h
            .workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await;
        assert!(failed.is_err());
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(12)));

        h.documents.set_fail_commits(false);
        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(7)));
    }

    #[tokio::test]
    async fn test_service_lines_move_no_stock() {
        let h = TestHarness::new().await;
        let mut items = CommerceFixtures::ten_tables();
        items.push(LineItem::from_product(&CommerceFixtures::installation(), dec!(1)));
        let note = h
            .workflow
            .create_delivery_note(&h.admin, DocumentCommandBuilder::new().with_items(items).delivery_note())
            .await
            .unwrap();

        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();
        assert_eq!(h.stock_store.quantity(IdFixtures::product_id()).await, Some(dec!(2)));
        let movements = h.stock.movements(IdFixtures::service_product_id()).await.unwrap();
        assert!(movements.is_empty());
    }

    #[tokio::test]
    async fn test_shipped_note_invoices_delivered_quantities() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;

        let pending = h
            .workflow
            .convert_delivery_note_to_invoice(&h.admin, note.id, DocumentCommandBuilder::new().conversion())
            .await;
        assert!(pending.is_err());

        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();
        let invoice = h
            .workflow
            .convert_delivery_note_to_invoice(&h.admin, note.id, DocumentCommandBuilder::new().conversion())
            .await
            .unwrap();

        assert_eq!(invoice.totals.total_ht.amount(), dec!(500));
        assert_eq!(invoice.totals.total_ttc.amount(), dec!(600));
        assert!(matches!(
            &invoice.origin,
            InvoiceOrigin::DeliveryNote { delivery_note_id, .. } if *delivery_note_id == note.id
        ));

        let again = h
            .workflow
            .convert_delivery_note_to_invoice(&h.admin, note.id, DocumentCommandBuilder::new().conversion())
            .await;
        assert!(matches!(again, Err(CommerceError::AlreadyConverted(_))));
    }

    #[tokio::test]
    async fn test_dispatched_quantities_are_frozen() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;
        h.workflow
            .transition_delivery_note(&h.admin, note.id, DeliveryTransitionCommand::to(DeliveryStatus::Shipped))
            .await
            .unwrap();

        let result = h.workflow.set_delivered_quantity(&h.admin, note.id, 0, dec!(6)).await;
        assert!(matches!(result, Err(CommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cannot_deliver_more_than_ordered() {
        let h = TestHarness::new().await;
        let note = note_for_five(&h).await;

        let result = h.workflow.set_delivered_quantity(&h.admin, note.id, 0, dec!(11)).await;
        assert!(matches!(result, Err(CommerceError::Validation(_))));

        let stored = h.workflow.load_delivery_note(note.id).await.unwrap();
        assert_eq!(stored.items[0].quantity_delivered, dec!(5));
        assert_eq!(stored.version, note.version);
    }
}

mod purchases {
    use super::*;
    use domain_commerce::{purchase_document, SupplierSnapshot};

    fn purchase(supplier: SupplierSnapshot, reference: &str) -> PurchaseCommand {
        PurchaseCommand {
            supplier,
            reference: reference.into(),
            date: TemporalFixtures::today(),
            items: CommerceFixtures::ten_tables(),
            expense_account: None,
        }
    }

    #[tokio::test]
    async fn test_purchase_document_is_stable_per_supplier_reference() {
        let h = TestHarness::new().await;
        let first = h
            .workflow
            .record_purchase(&h.admin, purchase(CommerceFixtures::supplier(), "FA-778"))
            .await
            .unwrap();
        let replay = h
            .workflow
            .record_purchase(&h.admin, purchase(CommerceFixtures::supplier(), "FA-778"))
            .await
            .unwrap();

        assert_eq!(replay.id, first.id);
        assert_eq!(
            first.related,
            Some(purchase_document(IdFixtures::supplier_id(), "FA-778"))
        );
        assert_entry_moves(&first, "607000", dec!(1000));
        assert_entry_moves(&first, "401000", dec!(-1200));
        assert_eq!(h.accounting_store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_reference_from_another_supplier_is_another_document() {
        let other = SupplierId::new();
        assert_ne!(
            purchase_document(IdFixtures::supplier_id(), "FA-778"),
            purchase_document(other, "FA-778")
        );
        assert_ne!(
            purchase_document(IdFixtures::supplier_id(), "FA-778"),
            purchase_document(IdFixtures::supplier_id(), "FA-779")
        );

        let h = TestHarness::new().await;
        let entry = h
            .workflow
            .record_purchase(&h.admin, purchase(SupplierSnapshot::new(other, "Bois & Co"), "FA-778"))
            .await
            .unwrap();
        assert_eq!(entry.related, Some(purchase_document(other, "FA-778")));
    }
}

mod outbox {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_ledger_defers_the_sale() {
        let h = TestHarness::new().await;
        h.accounting_store.set_ledger_unavailable(true);

        let invoice = sent_invoice(&h).await;
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(
            h.workflow.load_invoice(invoice.id).await.unwrap().status,
            InvoiceStatus::Sent
        );
        assert!(h.accounting_store.entries().await.is_empty());
        assert_eq!(h.documents.pending_count().await, 1);

        h.accounting_store.set_ledger_unavailable(false);
        let report = h.workflow.process_outbox().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 0);

        let entries = h.accounting_store.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].idempotency_key.as_deref(), Some(domain_commerce::sale_key(invoice.id).as_str()));
        assert_eq!(h.documents.pending_count().await, 0);

        let idle = h.workflow.process_outbox().await.unwrap();
        assert_eq!(idle, Default::default());
    }

    #[tokio::test]
    async fn test_message_dies_after_max_attempts() {
        let h = TestHarness::builder()
            .with_settings(OutboxSettings {
                batch_size: 100,
                max_attempts: 3,
            })
            .build()
            .await;
        h.accounting_store.set_ledger_unavailable(true);
        sent_invoice(&h).await;

        let first = h.workflow.process_outbox().await.unwrap();
        assert_eq!(first.failed, 1);
        let second = h.workflow.process_outbox().await.unwrap();
        assert_eq!(second.dead, 1);

        assert_eq!(h.documents.pending_count().await, 0);
        let messages = h.documents.messages().await;
        assert_eq!(messages[0].attempts, 3);
        assert!(messages[0].last_error.is_some());
    }

    #[tokio::test]
    async fn test_cancel_waits_for_the_sale() {
        let h = TestHarness::new().await;
        h.accounting_store.set_ledger_unavailable(true);
        let invoice = sent_invoice(&h).await;
        h.workflow
            .cancel_invoice(&h.admin, invoice.id, close("Erreur"))
            .await
            .unwrap();
        assert_eq!(h.documents.pending_count().await, 2);

        h.accounting_store.set_ledger_unavailable(false);
        let report = h.workflow.process_outbox().await.unwrap();
        assert_eq!(report.dispatched, 2);

        let entries = h.accounting_store.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reverses, Some(entries[0].id));
    }

    #[tokio::test]
    async fn test_payment_reversal_before_payment_is_posted() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        h.accounting_store.set_ledger_unavailable(true);
        let paid = h
            .workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(300)))
            .await
            .unwrap();
        h.workflow
            .reverse_payment(
                &h.admin,
                invoice.id,
                ReversePaymentCommand {
                    payment_id: paid.payments[0].id,
                    reason: "Virement rejeté".into(),
                    date: TemporalFixtures::today(),
                },
            )
            .await
            .unwrap();

        h.accounting_store.set_ledger_unavailable(false);
        h.workflow.process_outbox().await.unwrap();

        let entries = h.accounting_store.entries().await;
        let payment = entries
            .iter()
            .find(|e| e.transaction_type == TransactionType::PaymentReceived)
            .unwrap();
        let reversal = entries.iter().find(|e| e.reverses == Some(payment.id)).unwrap();
        assert_eq!(reversal.transaction_type, TransactionType::Reversal);
        assert_eq!(h.documents.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block() {
        let h = TestHarness::new().await;
        let invoice = sent_invoice(&h).await;
        h.notifier.set_failing(true);

        h.workflow
            .record_payment(&h.admin, invoice.id, payment(dec!(200)))
            .await
            .unwrap();
        assert_eq!(h.documents.pending_count().await, 0);
    }
}

mod properties {
    use super::*;
    use core_kernel::Currency;
    use domain_commerce::{compute_document_totals, derive_status, StatusInputs};
    use proptest::prelude::*;
    use test_utils::line_items_strategy;

    fn inputs(total: Decimal, paid: Decimal, ever_sent: bool, due_offset: i64) -> StatusInputs {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        StatusInputs {
            total_ttc: total,
            amount_paid: paid,
            due_date: Some(today + chrono::Duration::days(due_offset)),
            today,
            ever_sent,
            viewed: false,
        }
    }

    proptest! {
        #[test]
        fn test_totals_match_breakdown(items in line_items_strategy(8)) {
            let totals = compute_document_totals(&items, Currency::EUR).unwrap();
            let base: Decimal = totals.vat_breakdown.iter().map(|b| b.base_ht.amount()).sum();
            let vat: Decimal = totals.vat_breakdown.iter().map(|b| b.vat.amount()).sum();

            prop_assert_eq!(base, totals.total_ht.amount());
            prop_assert_eq!(vat, totals.total_vat.amount());
            prop_assert_eq!(
                totals.total_ttc.amount(),
                totals.total_ht.amount() + totals.total_vat.amount()
            );
        }

        #[test]
        fn test_fully_paid_is_paid(
            total in 1i64..1_000_000i64,
            extra in 0i64..1_000i64,
            due_offset in -30i64..30i64,
        ) {
            let total = Decimal::new(total, 2);
            let status = derive_status(
                InvoiceStatus::Overdue,
                &inputs(total, total + Decimal::new(extra, 2), true, due_offset),
            );
            prop_assert_eq!(status, InvoiceStatus::Paid);
        }

        #[test]
        fn test_partial_payment_wins_over_overdue(
            total in 2i64..1_000_000i64,
            share in 1u32..100u32,
            due_offset in -30i64..30i64,
        ) {
            let total = Decimal::new(total, 2);
            let paid = (total * Decimal::from(share) / Decimal::from(100)).round_dp(2);
            prop_assume!(paid > Decimal::ZERO && paid < total);
            let status = derive_status(InvoiceStatus::Sent, &inputs(total, paid, true, due_offset));
            prop_assert_eq!(status, InvoiceStatus::PartiallyPaid);
        }

        #[test]
        fn test_absorbing_states_never_change(
            total in 0i64..1_000_000i64,
            paid in 0i64..1_000_000i64,
            voided in any::<bool>(),
        ) {
            let current = if voided { InvoiceStatus::Voided } else { InvoiceStatus::Cancelled };
            let status = derive_status(
                current,
                &inputs(Decimal::new(total, 2), Decimal::new(paid, 2), true, -1),
            );
            prop_assert_eq!(status, current);
        }

        #[test]
        fn test_unsent_unpaid_stays_draft(total in 1i64..1_000_000i64, due_offset in -30i64..30i64) {
            let status = derive_status(
                InvoiceStatus::Draft,
                &inputs(Decimal::new(total, 2), Decimal::ZERO, false, due_offset),
            );
            prop_assert_eq!(status, InvoiceStatus::Draft);
        }
    }
}
