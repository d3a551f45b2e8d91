//! Transactional outbox
//!
//! Side effects of a document change (ledger postings, reversals,
//! notifications) are written as messages in the same atomic save as the
//! document. A message stays pending until it has been carried out, so a
//! crash or a failing ledger never loses an accounting counterpart.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{DomainNotification, OutboxMessageId};
use domain_accounting::{DocumentRef, NewJournalEntry, TransactionType};

/// Side effect to carry out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxCommand {
    /// Append a prepared entry; its idempotency key makes retries safe
    PostJournalEntry { entry: NewJournalEntry },
    /// Reverse every entry of a type posted for a document
    ReverseDocumentEntries {
        document: DocumentRef,
        transaction_type: TransactionType,
        reason: String,
        date: NaiveDate,
    },
    /// Reverse the entry appended with `key`
    ReverseEntryByKey {
        key: String,
        reason: String,
        date: NaiveDate,
    },
    Notify { notification: DomainNotification },
}

impl OutboxCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OutboxCommand::PostJournalEntry { .. } => "post_journal_entry",
            OutboxCommand::ReverseDocumentEntries { .. } => "reverse_document_entries",
            OutboxCommand::ReverseEntryByKey { .. } => "reverse_entry_by_key",
            OutboxCommand::Notify { .. } => "notify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Dispatched,
    /// Gave up after the maximum number of attempts
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Dispatched => "dispatched",
            OutboxStatus::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OutboxStatus::Pending),
            "dispatched" => Some(OutboxStatus::Dispatched),
            "dead" => Some(OutboxStatus::Dead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxMessageId,
    pub command: OutboxCommand,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(command: OutboxCommand) -> Self {
        Self {
            id: OutboxMessageId::new(),
            command,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            dispatched_at: None,
        }
    }

    /// Posting message; an entry without a key is keyed by the message id
    pub fn post(mut entry: NewJournalEntry) -> Self {
        let id = OutboxMessageId::new();
        if entry.idempotency_key.is_none() {
            entry.idempotency_key = Some(format!("outbox:{id}"));
        }
        Self {
            id,
            ..Self::new(OutboxCommand::PostJournalEntry { entry })
        }
    }

    pub fn notify(notification: DomainNotification) -> Self {
        Self::new(OutboxCommand::Notify { notification })
    }
}

/// Retry settings for outbox processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    /// Messages fetched per `process_outbox` call
    pub batch_size: u32,
    /// A message is marked dead after this many failed attempts
    pub max_attempts: u32,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 10,
        }
    }
}

/// Result of one outbox run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxReport {
    pub dispatched: u32,
    pub failed: u32,
    pub dead: u32,
}
