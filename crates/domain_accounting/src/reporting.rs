//! Financial reports derived from the journal
//!
//! The [`ReportingEngine`] never writes. Every report folds ledger lines
//! against the chart of accounts. Reads are not snapshot-isolated against
//! concurrent appends: a report computed while entries are being posted is
//! a point-in-time approximation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use core_kernel::{AccountId, Actor, Permission};

use crate::account::{Account, AccountFilter, AccountType, NormalBalance};
use crate::chart::ChartOfAccounts;
use crate::error::AccountingError;
use crate::journal::{AccountSummary, AccountTotals, LedgerLine, LedgerLineFilter, Page, BALANCE_TOLERANCE};
use crate::ports::LedgerPort;

/// Maximum `|assets − (liabilities + equity)|` for a balanced sheet
pub const BALANCE_SHEET_TOLERANCE: Decimal = dec!(0.01);

/// Account designation accepted by the general ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSelector {
    Id(AccountId),
    Number(String),
}

/// General ledger query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedgerQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub account: Option<AccountSelector>,
    pub page: Option<Page>,
}

/// A page of general ledger lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralLedgerReport {
    pub lines: Vec<LedgerLine>,
    /// Lines matching the query, all pages included
    pub total_count: u64,
    /// Debit sum over all matching lines
    pub total_debit: Decimal,
    /// Credit sum over all matching lines
    pub total_credit: Decimal,
    pub page: Option<Page>,
}

/// One account on the balance sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetRow {
    pub account_id: AccountId,
    pub number: String,
    pub name: String,
    pub account_type: AccountType,
    /// Signed so the account's normal side reads positive
    pub balance: Decimal,
}

/// The accounting equation as computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationCheck {
    pub assets: Decimal,
    pub liabilities_and_equity: Decimal,
    pub difference: Decimal,
    pub balanced: bool,
}

/// Balance sheet at a date
///
/// Point-in-time approximation when entries are appended concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<BalanceSheetRow>,
    pub liabilities: Vec<BalanceSheetRow>,
    pub equity: Vec<BalanceSheetRow>,
    /// OTHER accounts, excluded from the equation
    pub unclassified: Vec<BalanceSheetRow>,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity_accounts: Decimal,
    pub total_revenue: Decimal,
    pub total_expense: Decimal,
    /// `total_revenue − total_expense`
    pub net_income: Decimal,
    /// Equity accounts plus net income
    pub total_equity: Decimal,
    pub total_unclassified: Decimal,
    pub check: EquationCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account: AccountSummary,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Signed by the account's normal balance
    pub balance: Decimal,
}

/// Debit and credit totals per account at a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub difference: Decimal,
    pub balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub entry_number: String,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub running_balance: Decimal,
}

/// Movements of one account over a period with running balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account: AccountSummary,
    pub normal_balance: Option<NormalBalance>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub opening_balance: Decimal,
    pub lines: Vec<StatementLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub closing_balance: Decimal,
}

/// Read-only report service
#[derive(Clone)]
pub struct ReportingEngine {
    chart: ChartOfAccounts,
    ledger: Arc<dyn LedgerPort>,
}

impl ReportingEngine {
    pub fn new(chart: ChartOfAccounts, ledger: Arc<dyn LedgerPort>) -> Self {
        Self { chart, ledger }
    }

    /// Every line matching the query, sorted by (date, entry number)
    ///
    /// # Errors
    ///
    /// `AccountNotFound` when the selector names an unknown account
    pub async fn general_ledger(
        &self,
        actor: &Actor,
        query: &GeneralLedgerQuery,
    ) -> Result<GeneralLedgerReport, AccountingError> {
        actor.ensure(Permission::ViewReports)?;

        let mut filter = LedgerLineFilter::new();
        filter.date_from = query.start_date;
        filter.date_to = query.end_date;
        filter.account_id = match &query.account {
            Some(AccountSelector::Id(id)) => Some(self.chart.require_by_id(*id).await?.id),
            Some(AccountSelector::Number(number)) => Some(self.chart.require_by_number(number).await?.id),
            None => None,
        };

        let lines = self.ledger.query_lines(&filter, query.page).await?;
        let total_count = self.ledger.count_lines(&filter).await?;
        let totals = self.ledger.account_totals(&filter).await?;

        Ok(GeneralLedgerReport {
            lines,
            total_count,
            total_debit: totals.iter().map(|t| t.debit).sum(),
            total_credit: totals.iter().map(|t| t.credit).sum(),
            page: query.page,
        })
    }

    /// Balance sheet from every line dated on or before `as_of`
    pub async fn balance_sheet(&self, actor: &Actor, as_of: NaiveDate) -> Result<BalanceSheet, AccountingError> {
        actor.ensure(Permission::ViewReports)?;

        let accounts = self.chart.list(&AccountFilter::default()).await?;
        let totals = self.ledger.account_totals(&LedgerLineFilter::as_of(as_of)).await?;
        let sheet = build_balance_sheet(as_of, &accounts, &totals);

        if !sheet.check.balanced {
            tracing::warn!(
                %as_of,
                difference = %sheet.check.difference,
                "Balance sheet does not balance"
            );
        }
        Ok(sheet)
    }

    /// Trial balance from every line dated on or before `as_of`
    pub async fn trial_balance(&self, actor: &Actor, as_of: NaiveDate) -> Result<TrialBalance, AccountingError> {
        actor.ensure(Permission::ViewReports)?;

        let accounts = self.chart.list(&AccountFilter::default()).await?;
        let totals = self.ledger.account_totals(&LedgerLineFilter::as_of(as_of)).await?;
        Ok(build_trial_balance(as_of, &accounts, &totals))
    }

    /// Opening balance, movements with running balance, closing balance
    pub async fn account_statement(
        &self,
        actor: &Actor,
        account_id: AccountId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<AccountStatement, AccountingError> {
        actor.ensure(Permission::ViewReports)?;
        let account = self.chart.require_by_id(account_id).await?;

        let opening_net: Decimal = match start_date.and_then(|d| d.pred_opt()) {
            Some(day_before) => {
                let filter = LedgerLineFilter::as_of(day_before).for_account(account.id);
                self.ledger
                    .account_totals(&filter)
                    .await?
                    .iter()
                    .map(AccountTotals::net)
                    .sum()
            }
            None => Decimal::ZERO,
        };

        let mut filter = LedgerLineFilter::new().for_account(account.id);
        filter.date_from = start_date;
        filter.date_to = end_date;
        let rows = self.ledger.query_lines(&filter, None).await?;

        let opening_balance = account.signed_balance(opening_net);
        let mut running = opening_balance;
        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        let lines: Vec<StatementLine> = rows
            .into_iter()
            .map(|row| {
                running += account.signed_balance(row.line.net());
                total_debit += row.line.debit;
                total_credit += row.line.credit;
                StatementLine {
                    date: row.date,
                    entry_number: row.entry_number,
                    description: row.line.description.unwrap_or(row.entry_description),
                    debit: row.line.debit,
                    credit: row.line.credit,
                    running_balance: running,
                }
            })
            .collect();

        Ok(AccountStatement {
            account: AccountSummary::from(&account),
            normal_balance: account.normal_balance,
            start_date,
            end_date,
            opening_balance,
            lines,
            total_debit,
            total_credit,
            closing_balance: running,
        })
    }
}

/// Folds per-account totals into a balance sheet
///
/// Active accounts are always listed; inactive ones only while they still
/// carry a balance. Bucket totals are computed from raw `debit − credit`
/// so accounts whose normal side differs from their type's convention
/// (contra accounts) reduce their bucket.
pub fn build_balance_sheet(as_of: NaiveDate, accounts: &[Account], totals: &[AccountTotals]) -> BalanceSheet {
    let nets: HashMap<AccountId, Decimal> = totals.iter().map(|t| (t.account_id, t.net())).collect();

    let mut sheet = BalanceSheet {
        as_of,
        assets: Vec::new(),
        liabilities: Vec::new(),
        equity: Vec::new(),
        unclassified: Vec::new(),
        total_assets: Decimal::ZERO,
        total_liabilities: Decimal::ZERO,
        total_equity_accounts: Decimal::ZERO,
        total_revenue: Decimal::ZERO,
        total_expense: Decimal::ZERO,
        net_income: Decimal::ZERO,
        total_equity: Decimal::ZERO,
        total_unclassified: Decimal::ZERO,
        check: EquationCheck {
            assets: Decimal::ZERO,
            liabilities_and_equity: Decimal::ZERO,
            difference: Decimal::ZERO,
            balanced: true,
        },
    };

    for account in accounts {
        let net = nets.get(&account.id).copied().unwrap_or(Decimal::ZERO);
        if !account.is_active && net.is_zero() {
            continue;
        }

        let row = BalanceSheetRow {
            account_id: account.id,
            number: account.number.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            balance: account.signed_balance(net),
        };

        match account.account_type {
            AccountType::Asset => {
                sheet.total_assets += net;
                sheet.assets.push(row);
            }
            AccountType::Liability => {
                sheet.total_liabilities -= net;
                sheet.liabilities.push(row);
            }
            AccountType::Equity => {
                sheet.total_equity_accounts -= net;
                sheet.equity.push(row);
            }
            AccountType::Revenue => sheet.total_revenue -= net,
            AccountType::Expense => sheet.total_expense += net,
            AccountType::Other => {
                sheet.total_unclassified += net;
                sheet.unclassified.push(row);
            }
        }
    }

    sheet.net_income = sheet.total_revenue - sheet.total_expense;
    sheet.total_equity = sheet.total_equity_accounts + sheet.net_income;

    let liabilities_and_equity = sheet.total_liabilities + sheet.total_equity;
    let difference = sheet.total_assets - liabilities_and_equity;
    sheet.check = EquationCheck {
        assets: sheet.total_assets,
        liabilities_and_equity,
        difference,
        balanced: difference.abs() < BALANCE_SHEET_TOLERANCE,
    };
    sheet
}

/// Per-account debit/credit totals; accounts without movement are omitted
pub fn build_trial_balance(as_of: NaiveDate, accounts: &[Account], totals: &[AccountTotals]) -> TrialBalance {
    let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();

    let mut rows: Vec<TrialBalanceRow> = totals
        .iter()
        .filter(|t| !(t.debit.is_zero() && t.credit.is_zero()))
        .filter_map(|t| {
            by_id.get(&t.account_id).map(|account| TrialBalanceRow {
                account: AccountSummary::from(*account),
                debit: t.debit,
                credit: t.credit,
                balance: account.signed_balance(t.net()),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.account.number.cmp(&b.account.number));

    let total_debit: Decimal = rows.iter().map(|r| r.debit).sum();
    let total_credit: Decimal = rows.iter().map(|r| r.credit).sum();
    let difference = total_debit - total_credit;

    TrialBalance {
        as_of,
        rows,
        total_debit,
        total_credit,
        difference,
        balanced: difference.abs() < BALANCE_TOLERANCE,
    }
}
