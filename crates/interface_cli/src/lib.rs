//! Command line layer
//!
//! Loads configuration, installs the tracing subscriber, wires the
//! PostgreSQL adapters into the domain services and runs the
//! `ledger-admin` commands.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_cli::{AppConfig, Services};
//!
//! let config = AppConfig::load(None)?;
//! let (services, pool) = Services::connect(&config).await?;
//! let report = services.workflow.process_outbox().await?;
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod telemetry;

pub use app::{Ports, Services};
pub use cli::{Cli, Command};
pub use config::AppConfig;
pub use error::{CliError, ConfigError};
pub use telemetry::init_tracing;
