//! Test Data Builders
//!
//! Builders for commands with sensible defaults, and [`TestHarness`], the
//! full service graph wired over in-memory adapters. Tests specify only the
//! fields they care about.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use core_kernel::notification::mock::MockNotifier;
use core_kernel::sequence::mock::MockSequencePort;
use core_kernel::{Actor, Role, SequenceGenerator};
use domain_accounting::ports::mock::MockAccountingStore;
use domain_accounting::{AccountingService, ChartOfAccounts, Ledger, ReportingEngine};
use domain_commerce::ports::mock::MockCommerceStore;
use domain_commerce::{
    ClientSnapshot, ConvertToInvoiceCommand, CreateDeliveryNoteCommand, CreateInvoiceCommand, CreateQuoteCommand,
    DocumentWorkflow, LineItem, OutboxSettings, PaymentMethod, RecordPaymentCommand,
};
use domain_inventory::ports::mock::MockStockStore;
use domain_inventory::{NegativeStockPolicy, StockItem, StockLedger};

use crate::fixtures::{ChartFixtures, CommerceFixtures, IdFixtures, TemporalFixtures};

/// Every service of the ledger over in-memory stores
pub struct TestHarness {
    pub sequences: Arc<MockSequencePort>,
    pub accounting_store: MockAccountingStore,
    pub stock_store: MockStockStore,
    pub documents: MockCommerceStore,
    pub notifier: Arc<MockNotifier>,
    pub chart: ChartOfAccounts,
    pub accounting: AccountingService,
    pub reporting: ReportingEngine,
    pub stock: StockLedger,
    pub workflow: DocumentWorkflow,
    /// Holds every permission
    pub admin: Actor,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Standard chart, table stock of 12 with threshold 10, reject policy
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn actor(&self, role: Role) -> Actor {
        Actor::new(IdFixtures::user_id(), role)
    }
}

/// Builder for [`TestHarness`]
pub struct TestHarnessBuilder {
    stock_items: Vec<StockItem>,
    policy: NegativeStockPolicy,
    settings: OutboxSettings,
    today: fn() -> NaiveDate,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            stock_items: vec![
                CommerceFixtures::table_stock(Decimal::from(12), Decimal::from(10)),
                CommerceFixtures::installation_stock(),
            ],
            policy: NegativeStockPolicy::Reject,
            settings: OutboxSettings::default(),
            today: TemporalFixtures::today,
        }
    }
}

impl TestHarnessBuilder {
    /// Replaces the initial stock records
    pub fn with_stock(mut self, items: Vec<StockItem>) -> Self {
        self.stock_items = items;
        self
    }

    pub fn with_policy(mut self, policy: NegativeStockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: OutboxSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub async fn build(self) -> TestHarness {
        let sequences = Arc::new(MockSequencePort::new());
        let generator = SequenceGenerator::new(sequences.clone());

        let accounting_store = MockAccountingStore::with_accounts(ChartFixtures::standard_accounts()).await;
        let accounts = Arc::new(accounting_store.clone());
        let chart = ChartOfAccounts::new(accounts.clone(), accounts.clone());
        let ledger = Ledger::new(accounts.clone(), accounts.clone(), generator.clone());
        let accounting = AccountingService::new(chart.clone(), ledger);
        let reporting = ReportingEngine::new(chart.clone(), accounts);

        let notifier = Arc::new(MockNotifier::new());
        let stock_store = MockStockStore::with_items(self.stock_items).await;
        let stock = StockLedger::new(Arc::new(stock_store.clone()))
            .with_policy(self.policy)
            .with_notifier(notifier.clone());

        let documents = MockCommerceStore::new();
        let workflow = DocumentWorkflow::new(
            Arc::new(documents.clone()),
            Arc::new(documents.clone()),
            generator,
            accounting.clone(),
            stock.clone(),
            notifier.clone(),
        )
        .with_settings(self.settings)
        .with_calendar(self.today);

        TestHarness {
            sequences,
            accounting_store,
            stock_store,
            documents,
            notifier,
            chart,
            accounting,
            reporting,
            stock,
            workflow,
            admin: Actor::new(IdFixtures::user_id(), Role::Admin),
        }
    }
}

/// Builder for quote, invoice and delivery note creation commands
pub struct DocumentCommandBuilder {
    client: ClientSnapshot,
    items: Vec<LineItem>,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    valid_until: NaiveDate,
    notes: Option<String>,
    delivery_address: Option<String>,
}

impl Default for DocumentCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentCommandBuilder {
    /// Dupont SARL buying ten tables
    pub fn new() -> Self {
        Self {
            client: CommerceFixtures::client(),
            items: CommerceFixtures::ten_tables(),
            issue_date: TemporalFixtures::issue_date(),
            due_date: Some(TemporalFixtures::due_date()),
            valid_until: TemporalFixtures::quote_valid_until(),
            notes: None,
            delivery_address: None,
        }
    }

    pub fn with_client(mut self, client: ClientSnapshot) -> Self {
        self.client = client;
        self
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_issue_date(mut self, date: NaiveDate) -> Self {
        self.issue_date = date;
        self
    }

    pub fn with_due_date(mut self, date: Option<NaiveDate>) -> Self {
        self.due_date = date;
        self
    }

    pub fn with_valid_until(mut self, date: NaiveDate) -> Self {
        self.valid_until = date;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_delivery_address(mut self, address: impl Into<String>) -> Self {
        self.delivery_address = Some(address.into());
        self
    }

    pub fn quote(self) -> CreateQuoteCommand {
        CreateQuoteCommand {
            client: self.client,
            items: self.items,
            issue_date: self.issue_date,
            valid_until: self.valid_until,
            notes: self.notes,
        }
    }

    pub fn invoice(self) -> CreateInvoiceCommand {
        CreateInvoiceCommand {
            client: self.client,
            items: self.items,
            issue_date: self.issue_date,
            due_date: self.due_date,
        }
    }

    pub fn delivery_note(self) -> CreateDeliveryNoteCommand {
        CreateDeliveryNoteCommand {
            client: self.client,
            items: self.items,
            delivery_address: self.delivery_address,
            planned_date: Some(self.issue_date),
        }
    }

    pub fn conversion(self) -> ConvertToInvoiceCommand {
        ConvertToInvoiceCommand {
            issue_date: self.issue_date,
            due_date: self.due_date,
        }
    }
}

/// A bank transfer of `amount` on the fixture business day
pub fn payment(amount: Decimal) -> RecordPaymentCommand {
    RecordPaymentCommand {
        amount,
        date: TemporalFixtures::today(),
        method: PaymentMethod::BankTransfer,
        reference: None,
    }
}
