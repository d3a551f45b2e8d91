//! Command line error types

use thiserror::Error;

use core_kernel::ErrorKind;
use domain_accounting::AccountingError;
use domain_commerce::CommerceError;
use infra_db::DatabaseError;

/// Configuration could not be loaded or is inconsistent
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid setting {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a `ledger-admin` command
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Commerce(#[from] CommerceError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        let kind = match self {
            CliError::Config(_) => return 78,
            CliError::Database(_) | CliError::Output(_) => ErrorKind::Infrastructure,
            CliError::Accounting(e) => e.kind(),
            CliError::Commerce(e) => e.kind(),
        };
        match kind {
            ErrorKind::Validation => 65,
            ErrorKind::NotFound => 66,
            ErrorKind::Forbidden => 77,
            ErrorKind::Concurrency => 75,
            ErrorKind::Infrastructure => 69,
        }
    }
}
