//! Ledger administration binary
//!
//! # Usage
//!
//! ```bash
//! ledger-admin migrate
//! ledger-admin seed-chart
//! ledger-admin trial-balance --as-of 2024-12-31
//! ledger-admin general-ledger --account 411000 --from 2024-01-01 --limit 100
//! LEDGER_DATABASE__URL=postgres://... ledger-admin process-outbox
//! ```
//!
//! Settings come from `ledger.toml` (or `--config`) and `LEDGER_*`
//! environment variables. Reports are printed as JSON on stdout; logs go
//! to stderr.

use std::process::ExitCode;

use clap::Parser;

use core_kernel::Actor;
use interface_cli::{init_tracing, AppConfig, Cli, CliError, Command, Services};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let code = error
                .downcast_ref::<CliError>()
                .map(CliError::exit_code)
                .unwrap_or(1);
            tracing::error!(error = %error, "Command failed");
            eprintln!("error: {error:#}");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).map_err(CliError::from)?;
    init_tracing(&config.log).map_err(CliError::from)?;

    let (services, pool) = Services::connect(&config).await.map_err(CliError::from)?;

    let output = match cli.command {
        Command::Migrate => {
            infra_db::run_migrations(&pool).await.map_err(CliError::from)?;
            serde_json::json!({ "migrated": true })
        }
        command => {
            tracing::info!(?command, "Running command");
            command.execute(&services, &Actor::system()).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    pool.close().await;
    Ok(())
}
