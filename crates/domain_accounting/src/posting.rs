//! Translation of commercial events into journal entries
//!
//! Each event becomes one self-balancing entry. Accounts are resolved by
//! number from the chart; a missing account aborts the translation before
//! anything is written.
//!
//! | Event | Debit | Credit |
//! |---|---|---|
//! | Sale | receivable (TTC) | goods and service revenue (HT), VAT collected (VAT) |
//! | Payment received | bank or cash | receivable |
//! | Purchase | expense (HT), VAT deductible (VAT) | payable (TTC) |

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, Currency, Money, Permission};

use crate::account::Account;
use crate::chart::ChartOfAccounts;
use crate::error::AccountingError;
use crate::journal::{DocumentRef, JournalEntry, NewJournalEntry, NewJournalLine, TransactionType};
use crate::ledger::Ledger;

/// Account numbers used for automatic postings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingAccounts {
    pub receivable: String,
    pub sales_revenue: String,
    pub service_revenue: String,
    pub vat_collected: String,
    pub vat_deductible: String,
    pub bank: String,
    pub cash: String,
    pub purchases: String,
    pub payable: String,
}

impl Default for PostingAccounts {
    fn default() -> Self {
        Self {
            receivable: "411000".into(),
            sales_revenue: "707000".into(),
            service_revenue: "706000".into(),
            vat_collected: "445710".into(),
            vat_deductible: "445660".into(),
            bank: "512000".into(),
            cash: "530000".into(),
            purchases: "607000".into(),
            payable: "401000".into(),
        }
    }
}

/// Where money was received or paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementChannel {
    Bank,
    Cash,
}

/// A finalized sale (invoice sent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleEvent {
    pub document: DocumentRef,
    pub document_number: String,
    pub client_name: String,
    pub date: NaiveDate,
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
    /// Part of `total_ht` from service lines; the rest is goods revenue
    pub services_ht: Money,
}

/// A payment received against a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub document: DocumentRef,
    pub document_number: String,
    pub client_name: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub channel: SettlementChannel,
}

/// A supplier purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub document: DocumentRef,
    pub reference: String,
    pub supplier_name: String,
    pub date: NaiveDate,
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
    /// Replaces the default purchases account
    pub expense_account: Option<String>,
}

/// One line of a manual entry, by account number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualLine {
    pub account_number: String,
    pub description: Option<String>,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
}

/// A journal entry typed in by accounting staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualJournalEntryCommand {
    pub date: NaiveDate,
    pub description: String,
    pub lines: Vec<ManualLine>,
}

/// Builds and records postings for commercial events
#[derive(Clone)]
pub struct AccountingService {
    chart: ChartOfAccounts,
    ledger: Ledger,
    accounts: PostingAccounts,
    currency: Currency,
}

impl AccountingService {
    pub fn new(chart: ChartOfAccounts, ledger: Ledger) -> Self {
        Self {
            chart,
            ledger,
            accounts: PostingAccounts::default(),
            currency: Currency::EUR,
        }
    }

    pub fn with_accounts(mut self, accounts: PostingAccounts) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn chart(&self) -> &ChartOfAccounts {
        &self.chart
    }

    /// Sale entry: receivable TTC against revenue HT and VAT collected
    ///
    /// The HT amount is split between the goods and services revenue
    /// accounts; each share is credited only when non-zero.
    pub async fn prepare_sale(&self, event: &SaleEvent) -> Result<NewJournalEntry, AccountingError> {
        let ttc = self.amount(&event.total_ttc)?;
        let ht = self.amount(&event.total_ht)?;
        let vat = self.amount(&event.total_vat)?;
        let services_ht = self.amount(&event.services_ht)?;
        ensure_positive(ttc, "sale total")?;
        if services_ht > ht {
            return Err(AccountingError::Validation(format!(
                "service revenue {} exceeds the sale total HT {}",
                services_ht, ht
            )));
        }
        let goods_ht = ht - services_ht;

        let receivable = self.resolve(&self.accounts.receivable).await?;
        let label = format!("Facture {} - {}", event.document_number, event.client_name);
        let mut entry = NewJournalEntry::new(event.date, label.clone(), TransactionType::Sale)
            .with_related(event.document)
            .debit(&receivable, ttc, label.clone());
        if !goods_ht.is_zero() {
            let revenue = self.resolve(&self.accounts.sales_revenue).await?;
            entry = entry.credit(&revenue, goods_ht, format!("Vente {}", event.document_number));
        }
        if !services_ht.is_zero() {
            let revenue = self.resolve(&self.accounts.service_revenue).await?;
            entry = entry.credit(&revenue, services_ht, format!("Prestation {}", event.document_number));
        }
        if !vat.is_zero() {
            let vat_account = self.resolve(&self.accounts.vat_collected).await?;
            entry = entry.credit(&vat_account, vat, format!("TVA collectée {}", event.document_number));
        }

        entry.validate()?;
        Ok(entry)
    }

    /// Payment entry: bank (or cash) against receivable
    pub async fn prepare_payment_received(&self, event: &PaymentEvent) -> Result<NewJournalEntry, AccountingError> {
        let amount = self.amount(&event.amount)?;
        ensure_positive(amount, "payment amount")?;

        let treasury = self.resolve(self.treasury_number(event.channel)).await?;
        let receivable = self.resolve(&self.accounts.receivable).await?;

        let label = format!("Règlement {} - {}", event.document_number, event.client_name);
        let entry = NewJournalEntry::new(event.date, label.clone(), TransactionType::PaymentReceived)
            .with_related(event.document)
            .debit(&treasury, amount, label.clone())
            .credit(&receivable, amount, label);

        entry.validate()?;
        Ok(entry)
    }

    /// Purchase entry: expense HT and deductible VAT against payable TTC
    pub async fn prepare_purchase(&self, event: &PurchaseEvent) -> Result<NewJournalEntry, AccountingError> {
        let ttc = self.amount(&event.total_ttc)?;
        let ht = self.amount(&event.total_ht)?;
        let vat = self.amount(&event.total_vat)?;
        ensure_positive(ttc, "purchase total")?;

        let expense_number = event
            .expense_account
            .as_deref()
            .unwrap_or(&self.accounts.purchases);
        let expense = self.resolve(expense_number).await?;
        let payable = self.resolve(&self.accounts.payable).await?;

        let label = format!("Achat {} - {}", event.reference, event.supplier_name);
        let mut entry = NewJournalEntry::new(event.date, label.clone(), TransactionType::Purchase)
            .with_related(event.document);
        if !ht.is_zero() {
            entry = entry.debit(&expense, ht, label.clone());
        }
        if !vat.is_zero() {
            let vat_account = self.resolve(&self.accounts.vat_deductible).await?;
            entry = entry.debit(&vat_account, vat, format!("TVA déductible {}", event.reference));
        }
        entry = entry.credit(&payable, ttc, label);

        entry.validate()?;
        Ok(entry)
    }

    /// Manual entry, gated by `ManualJournal`
    pub async fn prepare_manual(
        &self,
        actor: &Actor,
        command: &ManualJournalEntryCommand,
    ) -> Result<NewJournalEntry, AccountingError> {
        actor.ensure(Permission::ManualJournal)?;

        let mut entry = NewJournalEntry::new(
            command.date,
            command.description.clone(),
            TransactionType::ManualJournal,
        )
        .with_created_by(actor.user_id);

        for line in &command.lines {
            let account = self.resolve(&line.account_number).await?;
            let mut new_line = NewJournalLine::debit(&account, line.debit);
            new_line.credit = line.credit;
            new_line.description = line.description.clone();
            entry.push_line(new_line);
        }

        entry.validate()?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self, event), fields(document = %event.document_number))]
    pub async fn record_sale(&self, event: &SaleEvent) -> Result<JournalEntry, AccountingError> {
        let entry = self.prepare_sale(event).await?;
        self.ledger.append(entry).await
    }

    #[tracing::instrument(skip(self, event), fields(document = %event.document_number))]
    pub async fn record_payment_received(&self, event: &PaymentEvent) -> Result<JournalEntry, AccountingError> {
        let entry = self.prepare_payment_received(event).await?;
        self.ledger.append(entry).await
    }

    #[tracing::instrument(skip(self, event), fields(reference = %event.reference))]
    pub async fn record_purchase(&self, event: &PurchaseEvent) -> Result<JournalEntry, AccountingError> {
        let entry = self.prepare_purchase(event).await?;
        self.ledger.append(entry).await
    }

    #[tracing::instrument(skip(self, actor, command), fields(user = %actor.user_id))]
    pub async fn record_manual(
        &self,
        actor: &Actor,
        command: &ManualJournalEntryCommand,
    ) -> Result<JournalEntry, AccountingError> {
        let entry = self.prepare_manual(actor, command).await?;
        self.ledger.append(entry).await
    }

    fn treasury_number(&self, channel: SettlementChannel) -> &str {
        match channel {
            SettlementChannel::Bank => &self.accounts.bank,
            SettlementChannel::Cash => &self.accounts.cash,
        }
    }

    async fn resolve(&self, number: &str) -> Result<Account, AccountingError> {
        let account = self.chart.require_by_number(number).await?;
        if !account.is_active {
            return Err(AccountingError::AccountInactive(account.number));
        }
        Ok(account)
    }

    fn amount(&self, money: &Money) -> Result<Decimal, AccountingError> {
        if money.currency() != self.currency {
            return Err(AccountingError::Validation(format!(
                "amount in {} but the ledger keeps {}",
                money.currency(),
                self.currency
            )));
        }
        let amount = money.round_to_currency().amount();
        if amount < Decimal::ZERO {
            return Err(AccountingError::Validation(format!("negative amount {}", amount)));
        }
        Ok(amount)
    }
}

fn ensure_positive(amount: Decimal, what: &str) -> Result<(), AccountingError> {
    if amount <= Decimal::ZERO {
        return Err(AccountingError::Validation(format!("{} must be positive", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::chart::standard_french_chart;
    use crate::journal::DocumentType;
    use crate::ports::mock::MockAccountingStore;
    use core_kernel::sequence::mock::MockSequencePort;
    use core_kernel::{InvoiceId, Role, SequenceGenerator, UserId};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn service() -> (AccountingService, MockAccountingStore) {
        let accounts: Vec<Account> = standard_french_chart()
            .into_iter()
            .map(|a: NewAccount| a.into_account().unwrap())
            .collect();
        let store = MockAccountingStore::with_accounts(accounts).await;
        let chart = ChartOfAccounts::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let ledger = Ledger::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SequenceGenerator::new(Arc::new(MockSequencePort::new())),
        );
        (AccountingService::new(chart, ledger), store)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    fn sale(ht: Decimal, vat: Decimal) -> SaleEvent {
        SaleEvent {
            document: DocumentRef::new(DocumentType::Invoice, InvoiceId::new()),
            document_number: "FAC24000001".into(),
            client_name: "ACME".into(),
            date: date(),
            total_ht: Money::eur(ht),
            total_vat: Money::eur(vat),
            total_ttc: Money::eur(ht + vat),
            services_ht: Money::eur(Decimal::ZERO),
        }
    }

    #[tokio::test]
    async fn test_sale_produces_three_lines() {
        let (service, _) = service().await;
        let entry = service.record_sale(&sale(dec!(1000), dec!(200))).await.unwrap();

        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.lines[0].account_number, "411000");
        assert_eq!(entry.lines[0].debit, dec!(1200));
        assert_eq!(entry.lines[1].account_number, "707000");
        assert_eq!(entry.lines[1].credit, dec!(1000));
        assert_eq!(entry.lines[2].account_number, "445710");
        assert_eq!(entry.lines[2].credit, dec!(200));
        assert_eq!(entry.total_debit(), entry.total_credit());
    }

    #[tokio::test]
    async fn test_mixed_sale_splits_revenue_by_kind() {
        let (service, _) = service().await;
        let mut event = sale(dec!(1000), dec!(200));
        event.services_ht = Money::eur(dec!(300));
        let entry = service.prepare_sale(&event).await.unwrap();

        let credits: Vec<(&str, Decimal)> = entry
            .lines
            .iter()
            .filter(|l| l.credit > Decimal::ZERO)
            .map(|l| (l.account_number.as_str(), l.credit))
            .collect();
        assert_eq!(
            credits,
            vec![("707000", dec!(700)), ("706000", dec!(300)), ("445710", dec!(200))]
        );
    }

    #[tokio::test]
    async fn test_service_share_above_total_is_rejected() {
        let (service, _) = service().await;
        let mut event = sale(dec!(100), dec!(20));
        event.services_ht = Money::eur(dec!(150));
        assert!(matches!(
            service.prepare_sale(&event).await,
            Err(AccountingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_sale_without_vat_has_two_lines() {
        let (service, _) = service().await;
        let entry = service.prepare_sale(&sale(dec!(300), dec!(0))).await.unwrap();
        assert_eq!(entry.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_account_writes_nothing() {
        let (service, store) = service().await;
        let service = service.with_accounts(PostingAccounts {
            vat_collected: "445799".into(),
            ..PostingAccounts::default()
        });

        let result = service.record_sale(&sale(dec!(1000), dec!(200))).await;
        assert!(matches!(result, Err(AccountingError::AccountNotFound(n)) if n == "445799"));
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_payment_by_cash_hits_cash_account() {
        let (service, _) = service().await;
        let event = PaymentEvent {
            document: DocumentRef::new(DocumentType::Invoice, InvoiceId::new()),
            document_number: "FAC24000001".into(),
            client_name: "ACME".into(),
            date: date(),
            amount: Money::eur(dec!(400)),
            channel: SettlementChannel::Cash,
        };
        let entry = service.record_payment_received(&event).await.unwrap();
        assert_eq!(entry.lines[0].account_number, "530000");
        assert_eq!(entry.lines[1].account_number, "411000");
        assert_eq!(entry.transaction_type, TransactionType::PaymentReceived);
    }

    #[tokio::test]
    async fn test_purchase_lines() {
        let (service, _) = service().await;
        let event = PurchaseEvent {
            document: DocumentRef::new(DocumentType::Purchase, uuid::Uuid::new_v4()),
            reference: "FA-778".into(),
            supplier_name: "Grossiste".into(),
            date: date(),
            total_ht: Money::eur(dec!(500)),
            total_vat: Money::eur(dec!(100)),
            total_ttc: Money::eur(dec!(600)),
            expense_account: None,
        };
        let entry = service.record_purchase(&event).await.unwrap();
        let numbers: Vec<&str> = entry.lines.iter().map(|l| l.account_number.as_str()).collect();
        assert_eq!(numbers, vec!["607000", "445660", "401000"]);
        assert_eq!(entry.lines[2].credit, dec!(600));
    }

    #[tokio::test]
    async fn test_foreign_currency_is_rejected() {
        let (service, _) = service().await;
        let mut event = sale(dec!(100), dec!(20));
        event.total_ttc = Money::new(dec!(120), Currency::USD);
        assert!(matches!(
            service.prepare_sale(&event).await,
            Err(AccountingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_entry_requires_permission() {
        let (service, _) = service().await;
        let command = ManualJournalEntryCommand {
            date: date(),
            description: "Apport".into(),
            lines: vec![
                ManualLine {
                    account_number: "512000".into(),
                    description: None,
                    debit: dec!(1000),
                    credit: dec!(0),
                },
                ManualLine {
                    account_number: "101000".into(),
                    description: None,
                    debit: dec!(0),
                    credit: dec!(1000),
                },
            ],
        };

        let sales = Actor::new(UserId::new(), Role::Sales);
        assert!(matches!(
            service.record_manual(&sales, &command).await,
            Err(AccountingError::Forbidden(_))
        ));

        let accountant = Actor::new(UserId::new(), Role::Accountant);
        let entry = service.record_manual(&accountant, &command).await.unwrap();
        assert_eq!(entry.created_by, Some(accountant.user_id));
        assert_eq!(entry.transaction_type, TransactionType::ManualJournal);
    }
}
