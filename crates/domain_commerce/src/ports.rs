//! Commerce Domain Ports
//!
//! Documents and their outbox messages are written through one
//! [`DocumentPort::commit`] call so a status change is never stored without
//! the side effects it implies. Every document save carries the version the
//! caller loaded; a mismatch is a `PortError::Conflict`.

use async_trait::async_trait;

use core_kernel::{DeliveryNoteId, DomainPort, InvoiceId, OutboxMessageId, PortError, QuoteId};

use crate::delivery::DeliveryNote;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::outbox::OutboxMessage;
use crate::quote::{Quote, QuoteStatus};

/// A document together with the version it was loaded at (0 for new documents)
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub document: T,
    pub expected_version: u64,
}

/// Everything written by one workflow step
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub quotes: Vec<Versioned<Quote>>,
    pub invoices: Vec<Versioned<Invoice>>,
    pub delivery_notes: Vec<Versioned<DeliveryNote>>,
    pub messages: Vec<OutboxMessage>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote(mut self, quote: &Quote, expected_version: u64) -> Self {
        self.quotes.push(Versioned {
            document: quote.clone(),
            expected_version,
        });
        self
    }

    pub fn invoice(mut self, invoice: &Invoice, expected_version: u64) -> Self {
        self.invoices.push(Versioned {
            document: invoice.clone(),
            expected_version,
        });
        self
    }

    pub fn delivery_note(mut self, note: &DeliveryNote, expected_version: u64) -> Self {
        self.delivery_notes.push(Versioned {
            document: note.clone(),
            expected_version,
        });
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = OutboxMessage>) -> Self {
        self.messages.extend(messages);
        self
    }
}

/// Persistence of commercial documents
#[async_trait]
pub trait DocumentPort: DomainPort {
    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, PortError>;

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    async fn get_delivery_note(&self, id: DeliveryNoteId) -> Result<Option<DeliveryNote>, PortError>;

    async fn quotes_with_status(&self, status: QuoteStatus) -> Result<Vec<Quote>, PortError>;

    async fn invoices_with_status(&self, statuses: &[InvoiceStatus]) -> Result<Vec<Invoice>, PortError>;

    /// Writes every document and message of the change set atomically
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` when a stored version differs from the expected
    /// one (or a new document already exists); nothing is written then.
    async fn commit(&self, changes: &ChangeSet) -> Result<(), PortError>;

    /// Deletes a quote stored at `expected_version`
    async fn delete_quote(&self, id: QuoteId, expected_version: u64) -> Result<(), PortError>;
}

/// Pending side effects
#[async_trait]
pub trait OutboxPort: DomainPort {
    /// Pending messages, oldest first
    async fn pending(&self, limit: u32) -> Result<Vec<OutboxMessage>, PortError>;

    async fn mark_dispatched(&self, id: OutboxMessageId) -> Result<(), PortError>;

    /// Counts a failed attempt; `dead` stops further retries
    async fn record_failure(&self, id: OutboxMessageId, error: &str, dead: bool) -> Result<(), PortError>;
}

/// In-memory document and outbox store for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use crate::outbox::OutboxStatus;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct State {
        quotes: HashMap<QuoteId, Quote>,
        invoices: HashMap<InvoiceId, Invoice>,
        delivery_notes: HashMap<DeliveryNoteId, DeliveryNote>,
        outbox: Vec<OutboxMessage>,
    }

    #[derive(Default, Clone)]
    pub struct MockCommerceStore {
        state: Arc<RwLock<State>>,
        unavailable: Arc<AtomicBool>,
        fail_commits: Arc<AtomicBool>,
    }

    impl MockCommerceStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Makes `commit` fail while reads keep working
        pub fn set_fail_commits(&self, fail: bool) {
            self.fail_commits.store(fail, Ordering::SeqCst);
        }

        pub async fn messages(&self) -> Vec<OutboxMessage> {
            self.state.read().await.outbox.clone()
        }

        pub async fn pending_count(&self) -> usize {
            self.state
                .read()
                .await
                .outbox
                .iter()
                .filter(|m| m.status == OutboxStatus::Pending)
                .count()
        }

        fn check(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("document store"));
            }
            Ok(())
        }
    }

    fn check_version(stored: Option<u64>, expected: u64, entity: &str, id: &str) -> Result<(), PortError> {
        match (stored, expected) {
            (None, 0) => Ok(()),
            (Some(version), expected) if version == expected && expected > 0 => Ok(()),
            (stored, expected) => Err(PortError::conflict(format!(
                "{entity} {id}: expected version {expected}, stored {stored:?}"
            ))),
        }
    }

    impl DomainPort for MockCommerceStore {}

    #[async_trait]
    impl DocumentPort for MockCommerceStore {
        async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, PortError> {
            self.check()?;
            Ok(self.state.read().await.quotes.get(&id).cloned())
        }

        async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
            self.check()?;
            Ok(self.state.read().await.invoices.get(&id).cloned())
        }

        async fn get_delivery_note(&self, id: DeliveryNoteId) -> Result<Option<DeliveryNote>, PortError> {
            self.check()?;
            Ok(self.state.read().await.delivery_notes.get(&id).cloned())
        }

        async fn quotes_with_status(&self, status: QuoteStatus) -> Result<Vec<Quote>, PortError> {
            self.check()?;
            let state = self.state.read().await;
            let mut quotes: Vec<Quote> = state.quotes.values().filter(|q| q.status == status).cloned().collect();
            quotes.sort_by(|a, b| a.number.cmp(&b.number));
            Ok(quotes)
        }

        async fn invoices_with_status(&self, statuses: &[InvoiceStatus]) -> Result<Vec<Invoice>, PortError> {
            self.check()?;
            let state = self.state.read().await;
            let mut invoices: Vec<Invoice> = state
                .invoices
                .values()
                .filter(|i| statuses.contains(&i.status))
                .cloned()
                .collect();
            invoices.sort_by(|a, b| a.number.cmp(&b.number));
            Ok(invoices)
        }

        async fn commit(&self, changes: &ChangeSet) -> Result<(), PortError> {
            self.check()?;
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("document store"));
            }
            let mut state = self.state.write().await;

            for q in &changes.quotes {
                let stored = state.quotes.get(&q.document.id).map(|s| s.version);
                check_version(stored, q.expected_version, "quote", &q.document.number)?;
            }
            for i in &changes.invoices {
                let stored = state.invoices.get(&i.document.id).map(|s| s.version);
                check_version(stored, i.expected_version, "invoice", &i.document.number)?;
            }
            for n in &changes.delivery_notes {
                let stored = state.delivery_notes.get(&n.document.id).map(|s| s.version);
                check_version(stored, n.expected_version, "delivery note", &n.document.number)?;
            }

            for q in &changes.quotes {
                state.quotes.insert(q.document.id, q.document.clone());
            }
            for i in &changes.invoices {
                state.invoices.insert(i.document.id, i.document.clone());
            }
            for n in &changes.delivery_notes {
                state.delivery_notes.insert(n.document.id, n.document.clone());
            }
            state.outbox.extend(changes.messages.iter().cloned());
            Ok(())
        }

        async fn delete_quote(&self, id: QuoteId, expected_version: u64) -> Result<(), PortError> {
            self.check()?;
            let mut state = self.state.write().await;
            let stored = state.quotes.get(&id).map(|q| q.version);
            match stored {
                None => Err(PortError::not_found("Quote", id)),
                Some(version) if version != expected_version => Err(PortError::conflict(format!(
                    "quote {id}: expected version {expected_version}, stored {version}"
                ))),
                Some(_) => {
                    state.quotes.remove(&id);
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl OutboxPort for MockCommerceStore {
        async fn pending(&self, limit: u32) -> Result<Vec<OutboxMessage>, PortError> {
            self.check()?;
            Ok(self
                .state
                .read()
                .await
                .outbox
                .iter()
                .filter(|m| m.status == OutboxStatus::Pending)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn mark_dispatched(&self, id: OutboxMessageId) -> Result<(), PortError> {
            self.check()?;
            let mut state = self.state.write().await;
            let message = state
                .outbox
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| PortError::not_found("OutboxMessage", id))?;
            message.status = OutboxStatus::Dispatched;
            message.attempts += 1;
            message.dispatched_at = Some(Utc::now());
            Ok(())
        }

        async fn record_failure(&self, id: OutboxMessageId, error: &str, dead: bool) -> Result<(), PortError> {
            self.check()?;
            let mut state = self.state.write().await;
            let message = state
                .outbox
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| PortError::not_found("OutboxMessage", id))?;
            message.attempts += 1;
            message.last_error = Some(error.to_string());
            if dead {
                message.status = OutboxStatus::Dead;
            }
            Ok(())
        }
    }
}
