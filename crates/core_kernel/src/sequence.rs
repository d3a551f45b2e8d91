//! Document numbering
//!
//! Every commercial document and journal entry receives a human-readable
//! number of the form `PREFIX‖YY‖zero-padded-counter` (e.g. `DEV24000001`).
//! The counter is kept per document type by a [`SequencePort`] whose
//! `next_value` must be a single atomic fetch-and-add: two concurrent callers
//! for the same key never receive the same integer.
//!
//! A storage failure surfaces as [`SequenceError::Storage`]; callers must not
//! persist a document without a number.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::ports::{DomainPort, PortError};

/// Smallest accepted pad width
pub const MIN_PAD_WIDTH: usize = 1;
/// Largest accepted pad width
pub const MAX_PAD_WIDTH: usize = 12;

/// Errors raised while minting a document number
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Pad width must be between 1 and 12, got {0}")]
    InvalidPadWidth(usize),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Sequence storage failed: {0}")]
    Storage(#[from] PortError),
}

/// Kinds of numbered documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    Invoice,
    DeliveryNote,
    JournalEntry,
}

impl DocumentKind {
    /// Stable counter key used by the sequence store
    pub fn key(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::Invoice => "invoice",
            DocumentKind::DeliveryNote => "delivery_note",
            DocumentKind::JournalEntry => "journal_entry",
        }
    }

    /// Default prefix printed in front of the number
    pub fn default_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "DEV",
            DocumentKind::Invoice => "FAC",
            DocumentKind::DeliveryNote => "BL",
            DocumentKind::JournalEntry => "EJ",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Prefix and zero-padding of one document kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub prefix: String,
    pub pad_width: usize,
}

impl NumberFormat {
    pub fn new(prefix: impl Into<String>, pad_width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            pad_width,
        }
    }

    fn default_for(kind: DocumentKind) -> Self {
        Self::new(kind.default_prefix(), 6)
    }
}

/// Number formats for every document kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingConfig {
    pub quote: NumberFormat,
    pub invoice: NumberFormat,
    pub delivery_note: NumberFormat,
    pub journal_entry: NumberFormat,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            quote: NumberFormat::default_for(DocumentKind::Quote),
            invoice: NumberFormat::default_for(DocumentKind::Invoice),
            delivery_note: NumberFormat::default_for(DocumentKind::DeliveryNote),
            journal_entry: NumberFormat::default_for(DocumentKind::JournalEntry),
        }
    }
}

impl NumberingConfig {
    /// Returns the format configured for a kind
    pub fn format_for(&self, kind: DocumentKind) -> &NumberFormat {
        match kind {
            DocumentKind::Quote => &self.quote,
            DocumentKind::Invoice => &self.invoice,
            DocumentKind::DeliveryNote => &self.delivery_note,
            DocumentKind::JournalEntry => &self.journal_entry,
        }
    }
}

/// Formats `PREFIX‖YY‖counter`, padding the counter to `pad_width` digits
///
/// Counters wider than the pad are printed in full.
pub fn format_document_number(prefix: &str, year: i32, value: u64, pad_width: usize) -> String {
    format!(
        "{}{:02}{:0width$}",
        prefix,
        year.rem_euclid(100),
        value,
        width = pad_width
    )
}

/// Storage of per-key counters
#[async_trait]
pub trait SequencePort: DomainPort {
    /// Atomically increments the counter for `key` (creating it at 0 first)
    /// and returns the new value
    async fn next_value(&self, key: &str) -> Result<u64, PortError>;

    /// Returns the last issued value, 0 when the counter does not exist yet
    async fn current_value(&self, key: &str) -> Result<u64, PortError>;
}

/// Mints document numbers from a [`SequencePort`]
#[derive(Clone)]
pub struct SequenceGenerator {
    port: Arc<dyn SequencePort>,
    config: NumberingConfig,
}

impl SequenceGenerator {
    pub fn new(port: Arc<dyn SequencePort>) -> Self {
        Self {
            port,
            config: NumberingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NumberingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &NumberingConfig {
        &self.config
    }

    /// Issues the next number for `document_type`
    ///
    /// # Arguments
    ///
    /// * `document_type` - Counter key
    /// * `prefix` - Printed prefix, ASCII alphanumeric
    /// * `pad_width` - Minimum counter width, 1..=12
    /// * `on` - Business date whose two-digit year is embedded
    ///
    /// # Errors
    ///
    /// Returns `InvalidPadWidth`/`InvalidPrefix` before touching storage and
    /// `Storage` when the atomic increment fails.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn next(
        &self,
        document_type: &str,
        prefix: &str,
        pad_width: usize,
        on: NaiveDate,
    ) -> Result<String, SequenceError> {
        if !(MIN_PAD_WIDTH..=MAX_PAD_WIDTH).contains(&pad_width) {
            return Err(SequenceError::InvalidPadWidth(pad_width));
        }
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SequenceError::InvalidPrefix(prefix.to_string()));
        }

        let value = self.port.next_value(document_type).await?;
        let number = format_document_number(prefix, on.year(), value, pad_width);
        tracing::debug!(document_type, value, number = %number, "Issued document number");
        Ok(number)
    }

    /// Issues the next number for a document kind using the configured format
    pub async fn next_for(&self, kind: DocumentKind, on: NaiveDate) -> Result<String, SequenceError> {
        let format = self.config.format_for(kind);
        self.next(kind.key(), &format.prefix, format.pad_width, on).await
    }
}

/// In-memory sequence store for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Counter map guarded by a single mutex
    #[derive(Default)]
    pub struct MockSequencePort {
        counters: Mutex<HashMap<String, u64>>,
        unavailable: AtomicBool,
    }

    impl MockSequencePort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulates storage being down (or back up)
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::unavailable("sequence store"));
            }
            Ok(())
        }
    }

    impl DomainPort for MockSequencePort {}

    #[async_trait]
    impl SequencePort for MockSequencePort {
        async fn next_value(&self, key: &str) -> Result<u64, PortError> {
            self.check_available()?;
            let mut counters = self.counters.lock().await;
            let counter = counters.entry(key.to_string()).or_insert(0);
            *counter += 1;
            Ok(*counter)
        }

        async fn current_value(&self, key: &str) -> Result<u64, PortError> {
            self.check_available()?;
            Ok(self.counters.lock().await.get(key).copied().unwrap_or(0))
        }
    }
}
