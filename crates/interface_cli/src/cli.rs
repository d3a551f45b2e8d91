//! `ledger-admin` commands
//!
//! Every command prints its result as pretty JSON on stdout.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use core_kernel::{business_today, Actor};
use domain_accounting::{AccountSelector, GeneralLedgerQuery, Page};

use crate::app::Services;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "ledger-admin", version, about = "Ledger administration and reports")]
pub struct Cli {
    /// Configuration file (defaults to ./ledger.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply the embedded schema migrations
    Migrate,
    /// Create the standard French chart accounts that are missing
    SeedChart,
    /// Assets against liabilities and equity at a date
    BalanceSheet {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Journal lines ordered by date and entry number
    GeneralLedger {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Account number, e.g. 411000
        #[arg(long)]
        account: Option<String>,
        #[arg(long, requires = "limit")]
        offset: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Debit and credit totals per account at a date
    TrialBalance {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Carry out pending ledger postings and notifications
    ProcessOutbox,
}

impl Command {
    /// General ledger query built from the flags
    pub fn general_ledger_query(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        account: Option<String>,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> GeneralLedgerQuery {
        GeneralLedgerQuery {
            start_date: from,
            end_date: to,
            account: account.map(AccountSelector::Number),
            page: limit.map(|limit| Page::new(offset.unwrap_or(0), limit)),
        }
    }

    /// Runs a command that only needs the services
    ///
    /// `Migrate` needs the pool and is handled by the binary.
    pub async fn execute(self, services: &Services, actor: &Actor) -> Result<Value, CliError> {
        match self {
            Command::Migrate => Ok(Value::Null),
            Command::SeedChart => {
                let created = services.chart.seed_standard_chart(actor).await?;
                info!(created = created.len(), "Chart seeded");
                to_json(&created)
            }
            Command::BalanceSheet { as_of } => {
                let report = services
                    .reporting
                    .balance_sheet(actor, as_of.unwrap_or_else(business_today))
                    .await?;
                to_json(&report)
            }
            Command::GeneralLedger {
                from,
                to,
                account,
                offset,
                limit,
            } => {
                let query = Self::general_ledger_query(from, to, account, offset, limit);
                to_json(&services.reporting.general_ledger(actor, &query).await?)
            }
            Command::TrialBalance { as_of } => {
                let report = services
                    .reporting
                    .trial_balance(actor, as_of.unwrap_or_else(business_today))
                    .await?;
                to_json(&report)
            }
            Command::ProcessOutbox => {
                let report = services.workflow.process_outbox().await?;
                info!(
                    dispatched = report.dispatched,
                    failed = report.failed,
                    dead = report.dead,
                    "Outbox processed"
                );
                to_json(&report)
            }
        }
    }
}

fn to_json(value: &impl Serialize) -> Result<Value, CliError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_general_ledger() {
        let cli = Cli::try_parse_from([
            "ledger-admin",
            "general-ledger",
            "--from",
            "2024-01-01",
            "--account",
            "411000",
            "--offset",
            "50",
            "--limit",
            "25",
        ])
        .unwrap();

        let Command::GeneralLedger {
            from,
            to,
            account,
            offset,
            limit,
        } = cli.command
        else {
            panic!("expected general-ledger");
        };
        let query = Command::general_ledger_query(from, to, account, offset, limit);
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(query.end_date, None);
        assert_eq!(query.account, Some(AccountSelector::Number("411000".into())));
        assert_eq!(query.page, Some(Page::new(50, 25)));
    }

    #[test]
    fn test_offset_requires_limit() {
        assert!(Cli::try_parse_from(["ledger-admin", "general-ledger", "--offset", "10"]).is_err());
    }

    #[test]
    fn test_parse_global_config_flag() {
        let cli = Cli::try_parse_from(["ledger-admin", "trial-balance", "--as-of", "2024-03-31", "--config", "prod.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert_eq!(
            cli.command,
            Command::TrialBalance {
                as_of: NaiveDate::from_ymd_opt(2024, 3, 31)
            }
        );
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        assert!(Cli::try_parse_from(["ledger-admin", "balance-sheet", "--as-of", "31/03/2024"]).is_err());
    }
}
