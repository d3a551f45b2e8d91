//! Wiring of storage adapters into the domain services

use std::sync::Arc;

use core_kernel::{NotificationPort, SequenceGenerator, SequencePort, TracingNotifier};
use domain_accounting::{AccountPort, AccountingService, ChartOfAccounts, Ledger, LedgerPort, ReportingEngine};
use domain_commerce::{DocumentPort, DocumentWorkflow, OutboxPort};
use domain_inventory::{StockLedger, StockPort};
use infra_db::{
    create_pool, DatabasePool, DatabaseError, PostgresAccountingStore, PostgresDocumentStore, PostgresSequenceStore,
    PostgresStockStore,
};

use crate::config::AppConfig;

/// One implementation per port
#[derive(Clone)]
pub struct Ports {
    pub sequences: Arc<dyn SequencePort>,
    pub accounts: Arc<dyn AccountPort>,
    pub ledger: Arc<dyn LedgerPort>,
    pub stock: Arc<dyn StockPort>,
    pub documents: Arc<dyn DocumentPort>,
    pub outbox: Arc<dyn OutboxPort>,
    pub notifier: Arc<dyn NotificationPort>,
}

impl Ports {
    /// PostgreSQL adapters sharing one pool; notifications go to the log
    pub fn postgres(pool: &DatabasePool) -> Self {
        let accounting = Arc::new(PostgresAccountingStore::new(pool.clone()));
        let documents = Arc::new(PostgresDocumentStore::new(pool.clone()));
        Self {
            sequences: Arc::new(PostgresSequenceStore::new(pool.clone())),
            accounts: accounting.clone(),
            ledger: accounting,
            stock: Arc::new(PostgresStockStore::new(pool.clone())),
            documents: documents.clone(),
            outbox: documents,
            notifier: Arc::new(TracingNotifier),
        }
    }
}

/// The services a command needs
#[derive(Clone)]
pub struct Services {
    pub chart: ChartOfAccounts,
    pub reporting: ReportingEngine,
    pub workflow: Arc<DocumentWorkflow>,
}

impl Services {
    pub fn wire(ports: Ports, config: &AppConfig) -> Self {
        let sequences = SequenceGenerator::new(ports.sequences).with_config(config.numbering.clone());
        let chart = ChartOfAccounts::new(ports.accounts.clone(), ports.ledger.clone());
        let ledger = Ledger::new(ports.accounts, ports.ledger.clone(), sequences.clone());
        let accounting = AccountingService::new(chart.clone(), ledger)
            .with_accounts(config.accounting.accounts.clone())
            .with_currency(config.accounting.currency);
        let reporting = ReportingEngine::new(chart.clone(), ports.ledger);
        let stock = StockLedger::new(ports.stock)
            .with_policy(config.inventory.negative_stock_policy)
            .with_notifier(ports.notifier.clone());
        let workflow = DocumentWorkflow::new(
            ports.documents,
            ports.outbox,
            sequences,
            accounting,
            stock,
            ports.notifier,
        )
        .with_settings(config.outbox)
        .with_currency(config.accounting.currency);

        Self {
            chart,
            reporting,
            workflow: Arc::new(workflow),
        }
    }

    /// Opens the pool and wires the PostgreSQL adapters
    pub async fn connect(config: &AppConfig) -> Result<(Self, DatabasePool), DatabaseError> {
        let pool = create_pool(&config.database).await?;
        let services = Self::wire(Ports::postgres(&pool), config);
        Ok((services, pool))
    }
}
