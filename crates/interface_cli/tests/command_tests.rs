//! ledger-admin Command Tests
//!
//! Commands run against services wired with the in-memory adapters.
//!
//! - `seeding` - chart seeding is idempotent
//! - `reports` - report commands render the ledger as JSON
//! - `outbox` - deferred postings are carried out on demand

use std::sync::Arc;

use core_kernel::notification::mock::MockNotifier;
use core_kernel::sequence::mock::MockSequencePort;
use core_kernel::{Actor, Role};
use domain_accounting::ports::mock::MockAccountingStore;
use domain_commerce::ports::mock::MockCommerceStore;
use domain_inventory::ports::mock::MockStockStore;
use interface_cli::{AppConfig, Command, Ports, Services};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use test_utils::{date, ChartFixtures, CommerceFixtures, DocumentCommandBuilder, IdFixtures};

struct Wired {
    services: Services,
    accounting: MockAccountingStore,
    documents: MockCommerceStore,
}

fn wire(accounting: MockAccountingStore) -> Wired {
    let documents = MockCommerceStore::new();
    let ports = Ports {
        sequences: Arc::new(MockSequencePort::new()),
        accounts: Arc::new(accounting.clone()),
        ledger: Arc::new(accounting.clone()),
        stock: Arc::new(MockStockStore::new()),
        documents: Arc::new(documents.clone()),
        outbox: Arc::new(documents.clone()),
        notifier: Arc::new(MockNotifier::new()),
    };
    Wired {
        services: Services::wire(ports, &AppConfig::default()),
        accounting,
        documents,
    }
}

async fn wired_with_chart() -> Wired {
    wire(MockAccountingStore::with_accounts(ChartFixtures::standard_accounts()).await)
}

/// Amounts are serialized as decimal strings
fn amount(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn admin() -> Actor {
    Actor::new(IdFixtures::user_id(), Role::Admin)
}

async fn send_invoice(wired: &Wired) {
    let workflow = &wired.services.workflow;
    let invoice = workflow
        .create_invoice(
            &admin(),
            DocumentCommandBuilder::new()
                .with_items(CommerceFixtures::ten_tables())
                .invoice(),
        )
        .await
        .unwrap();
    workflow.send_invoice(&admin(), invoice.id).await.unwrap();
}

mod seeding {
    use super::*;

    #[tokio::test]
    async fn test_seed_chart_creates_missing_accounts_once() {
        let wired = wire(MockAccountingStore::new());

        let first = Command::SeedChart.execute(&wired.services, &admin()).await.unwrap();
        let created = first.as_array().unwrap();
        assert_eq!(created.len(), 11);
        assert!(created.iter().any(|a| a["number"] == json!("411000")));

        let second = Command::SeedChart.execute(&wired.services, &admin()).await.unwrap();
        assert_eq!(second, json!([]));
    }

    #[tokio::test]
    async fn test_seed_chart_requires_account_management() {
        let wired = wire(MockAccountingStore::new());
        let viewer = Actor::new(IdFixtures::user_id(), Role::Viewer);

        let error = Command::SeedChart.execute(&wired.services, &viewer).await.unwrap_err();
        assert_eq!(error.exit_code(), 77);
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn test_trial_balance_after_a_sale() {
        let wired = wired_with_chart().await;
        send_invoice(&wired).await;

        let report = Command::TrialBalance {
            as_of: Some(date(2024, 12, 31)),
        }
        .execute(&wired.services, &admin())
        .await
        .unwrap();

        assert_eq!(report["balanced"], json!(true));
        assert_eq!(amount(&report["total_debit"]), dec!(1200));
        assert_eq!(amount(&report["total_credit"]), dec!(1200));
    }

    #[tokio::test]
    async fn test_general_ledger_by_account_number() {
        let wired = wired_with_chart().await;
        send_invoice(&wired).await;

        let report = Command::GeneralLedger {
            from: None,
            to: None,
            account: Some("411000".into()),
            offset: None,
            limit: None,
        }
        .execute(&wired.services, &admin())
        .await
        .unwrap();

        assert_eq!(report["total_count"], json!(1));
        assert_eq!(report["lines"][0]["account"]["number"], json!("411000"));
        assert_eq!(amount(&report["total_debit"]), dec!(1200));
    }

    #[tokio::test]
    async fn test_unknown_account_number_is_not_found() {
        let wired = wired_with_chart().await;
        let error = Command::GeneralLedger {
            from: None,
            to: None,
            account: Some("999999".into()),
            offset: None,
            limit: None,
        }
        .execute(&wired.services, &admin())
        .await
        .unwrap_err();
        assert_eq!(error.exit_code(), 66);
    }

    #[tokio::test]
    async fn test_balance_sheet_is_balanced() {
        let wired = wired_with_chart().await;
        send_invoice(&wired).await;

        let report = Command::BalanceSheet {
            as_of: Some(date(2024, 12, 31)),
        }
        .execute(&wired.services, &admin())
        .await
        .unwrap();

        assert_eq!(report["check"]["balanced"], json!(true));
        assert_eq!(amount(&report["total_assets"]), dec!(1200));
    }
}

mod outbox {
    use super::*;

    #[tokio::test]
    async fn test_process_outbox_posts_deferred_sale() {
        let wired = wired_with_chart().await;
        wired.accounting.set_ledger_unavailable(true);
        send_invoice(&wired).await;
        assert_eq!(wired.documents.pending_count().await, 1);

        wired.accounting.set_ledger_unavailable(false);
        let report = Command::ProcessOutbox
            .execute(&wired.services, &admin())
            .await
            .unwrap();

        assert_eq!(report, json!({ "dispatched": 1, "failed": 0, "dead": 0 }));
        assert_eq!(wired.documents.pending_count().await, 0);
        assert_eq!(wired.accounting.entries().await.len(), 1);
    }
}
