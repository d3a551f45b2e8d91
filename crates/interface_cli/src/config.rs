//! Application configuration
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`ledger.toml` unless another path is given)
//! 3. environment variables prefixed `LEDGER_`, nested keys separated by `__`
//!    (`LEDGER_DATABASE__URL`, `LEDGER_OUTBOX__MAX_ATTEMPTS`, ...)

use std::path::Path;

use serde::Deserialize;

use core_kernel::sequence::{MAX_PAD_WIDTH, MIN_PAD_WIDTH};
use core_kernel::{Currency, DocumentKind, NumberingConfig};
use domain_accounting::PostingAccounts;
use domain_commerce::OutboxSettings;
use domain_inventory::NegativeStockPolicy;
use infra_db::DatabaseConfig;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
pub const ENV_PREFIX: &str = "LEDGER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub numbering: NumberingConfig,
    pub accounting: AccountingConfig,
    pub inventory: InventoryConfig,
    pub outbox: OutboxSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub accounts: PostingAccounts,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub negative_stock_policy: NegativeStockPolicy,
}

impl AppConfig {
    /// Loads `.env`, then the layered sources
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let source = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(source)
    }

    /// Parses a TOML document layered over the defaults
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let source = config::Config::builder().add_source(config::File::from_str(toml, config::FileFormat::Toml));
        Self::from_builder(source)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in [
            DocumentKind::Quote,
            DocumentKind::Invoice,
            DocumentKind::DeliveryNote,
            DocumentKind::JournalEntry,
        ] {
            let format = self.numbering.format_for(kind);
            if !(MIN_PAD_WIDTH..=MAX_PAD_WIDTH).contains(&format.pad_width) {
                return Err(ConfigError::invalid(
                    format!("numbering.{}.pad_width", kind.key()),
                    format!("must be between {MIN_PAD_WIDTH} and {MAX_PAD_WIDTH}"),
                ));
            }
            if format.prefix.is_empty() {
                return Err(ConfigError::invalid(
                    format!("numbering.{}.prefix", kind.key()),
                    "must not be empty",
                ));
            }
        }
        if self.outbox.batch_size == 0 {
            return Err(ConfigError::invalid("outbox.batch_size", "must be positive"));
        }
        if self.outbox.max_attempts == 0 {
            return Err(ConfigError::invalid("outbox.max_attempts", "must be positive"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::invalid(
                "database.min_connections",
                "must not exceed database.max_connections",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.log.level, "info");
        assert!(!config.log.json);
        assert_eq!(config.numbering.invoice.prefix, "FAC");
        assert_eq!(config.accounting.accounts.receivable, "411000");
        assert_eq!(config.accounting.currency, Currency::EUR);
        assert_eq!(config.inventory.negative_stock_policy, NegativeStockPolicy::Reject);
        assert_eq!(config.outbox.max_attempts, 10);
    }

    #[test]
    fn test_file_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            url = "postgres://db/gestion"
            connect_timeout = 5

            [log]
            json = true

            [accounting.accounts]
            bank = "512100"

            [inventory]
            negative_stock_policy = "allow_with_alert"

            [outbox]
            batch_size = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "postgres://db/gestion");
        assert_eq!(config.database.connect_timeout, Duration::from_secs(5));
        assert!(config.log.json);
        assert_eq!(config.accounting.accounts.bank, "512100");
        assert_eq!(config.accounting.accounts.cash, "530000");
        assert_eq!(config.inventory.negative_stock_policy, NegativeStockPolicy::AllowWithAlert);
        assert_eq!(config.outbox.batch_size, 20);
        assert_eq!(config.outbox.max_attempts, 10);
    }

    #[test]
    fn test_numbering_override() {
        let config = AppConfig::from_toml(
            r#"
            [numbering]
            quote = { prefix = "Q", pad_width = 4 }
            invoice = { prefix = "INV", pad_width = 8 }
            delivery_note = { prefix = "BL", pad_width = 6 }
            journal_entry = { prefix = "EJ", pad_width = 6 }
            "#,
        )
        .unwrap();
        assert_eq!(config.numbering.quote.prefix, "Q");
        assert_eq!(config.numbering.invoice.pad_width, 8);
    }

    #[test]
    fn test_rejects_pad_width_out_of_range() {
        let error = AppConfig::from_toml(
            r#"
            [numbering]
            quote = { prefix = "DEV", pad_width = 13 }
            invoice = { prefix = "FAC", pad_width = 6 }
            delivery_note = { prefix = "BL", pad_width = 6 }
            journal_entry = { prefix = "EJ", pad_width = 6 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { ref field, .. } if field == "numbering.quote.pad_width"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let error = AppConfig::from_toml("[outbox]\nmax_attempts = 0").unwrap_err();
        assert!(error.to_string().contains("outbox.max_attempts"));
    }

    #[test]
    fn test_unknown_policy_fails_to_load() {
        let error = AppConfig::from_toml("[inventory]\nnegative_stock_policy = \"maybe\"").unwrap_err();
        assert!(matches!(error, ConfigError::Load(_)));
    }
}
