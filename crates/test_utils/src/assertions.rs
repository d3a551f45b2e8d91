//! Custom Test Assertions
//!
//! Assertion helpers for ledger types that print the offending numbers
//! instead of a bare `assertion failed`.

use core_kernel::Money;
use domain_accounting::{BalanceSheet, JournalEntry, TrialBalance};
use rust_decimal::Decimal;

/// Asserts that two Money values are equal in amount and currency
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Money amounts differ: actual={}, expected={}",
        actual.amount(),
        expected.amount()
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts that a posted entry balances and has at least two lines
pub fn assert_entry_balanced(entry: &JournalEntry) {
    assert!(
        entry.lines.len() >= 2,
        "Entry {} has {} line(s)",
        entry.number,
        entry.lines.len()
    );
    assert_eq!(
        entry.total_debit(),
        entry.total_credit(),
        "Entry {} is unbalanced: debit={}, credit={}",
        entry.number,
        entry.total_debit(),
        entry.total_credit()
    );
}

/// Asserts that an entry debits (positive) or credits (negative) an account by `net`
///
/// # Panics
///
/// Panics if no line of the entry targets the account
pub fn assert_entry_moves(entry: &JournalEntry, account_number: &str, net: Decimal) {
    let lines: Vec<_> = entry
        .lines
        .iter()
        .filter(|l| l.account_number == account_number)
        .collect();
    assert!(
        !lines.is_empty(),
        "Entry {} has no line on account {}",
        entry.number,
        account_number
    );
    let actual: Decimal = lines.iter().map(|l| l.net()).sum();
    assert_eq!(
        actual, net,
        "Entry {} moves {} by {}, expected {}",
        entry.number, account_number, actual, net
    );
}

/// Asserts Assets = Liabilities + Equity + (Revenue − Expense)
pub fn assert_balance_sheet_balanced(sheet: &BalanceSheet) {
    assert!(
        sheet.check.balanced,
        "Balance sheet at {} is off by {}: assets={}, liabilities+equity={}",
        sheet.as_of,
        sheet.check.difference,
        sheet.check.assets,
        sheet.check.liabilities_and_equity
    );
}

/// Asserts that total debits equal total credits
pub fn assert_trial_balance_balanced(trial: &TrialBalance) {
    assert!(
        trial.balanced,
        "Trial balance at {} is off by {}: debit={}, credit={}",
        trial.as_of,
        trial.difference,
        trial.total_debit,
        trial.total_credit
    );
}

/// Balance of one account on a balance sheet, zero when it has no row
pub fn balance_of(sheet: &BalanceSheet, account_number: &str) -> Decimal {
    sheet
        .assets
        .iter()
        .chain(&sheet.liabilities)
        .chain(&sheet.equity)
        .chain(&sheet.unclassified)
        .find(|row| row.number == account_number)
        .map(|row| row.balance)
        .unwrap_or(Decimal::ZERO)
}
