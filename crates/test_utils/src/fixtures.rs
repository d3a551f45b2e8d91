//! Pre-built Test Fixtures
//!
//! Ready-to-use test data for the ledger: dates, amounts, the standard
//! French chart, clients and products. Fixtures are deterministic so tests
//! can assert exact numbers.

use chrono::NaiveDate;
use core_kernel::{ClientId, Currency, Money, Percentage, ProductId, SupplierId, UserId};
use domain_accounting::{standard_french_chart, Account};
use domain_commerce::{ClientSnapshot, LineItem, ProductSnapshot, SupplierSnapshot};
use domain_inventory::StockItem;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// The standard chart, materialised once per test binary
static STANDARD_ACCOUNTS: Lazy<Vec<Account>> = Lazy::new(|| {
    standard_french_chart()
        .into_iter()
        .map(|input| input.into_account().expect("standard chart is valid"))
        .collect()
});

/// Shorthand for a calendar date
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The business day every workflow test runs on (15 March 2024)
    pub fn today() -> NaiveDate {
        date(2024, 3, 15)
    }

    /// Issue date of fixture documents
    pub fn issue_date() -> NaiveDate {
        date(2024, 3, 1)
    }

    /// Due date of fixture invoices, after `today`
    pub fn due_date() -> NaiveDate {
        date(2024, 3, 31)
    }

    /// A due date already behind `today`
    pub fn past_due_date() -> NaiveDate {
        date(2024, 3, 10)
    }

    pub fn quote_valid_until() -> NaiveDate {
        date(2024, 4, 30)
    }
}

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn eur(amount: Decimal) -> Money {
        Money::eur(amount)
    }

    pub fn eur_zero() -> Money {
        Money::zero(Currency::EUR)
    }

    /// 1 000 € HT, the canonical sale
    pub fn eur_1000() -> Money {
        Money::eur(dec!(1000))
    }

    /// A USD amount for currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100), Currency::USD)
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    pub fn client_id() -> ClientId {
        ClientId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").expect("valid uuid"))
    }

    pub fn product_id() -> ProductId {
        ProductId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").expect("valid uuid"))
    }

    pub fn service_product_id() -> ProductId {
        ProductId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440003").expect("valid uuid"))
    }

    pub fn supplier_id() -> SupplierId {
        SupplierId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440004").expect("valid uuid"))
    }

    pub fn user_id() -> UserId {
        UserId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440005").expect("valid uuid"))
    }
}

/// Fixture for chart of accounts data
pub struct ChartFixtures;

impl ChartFixtures {
    /// Every account of the standard French chart
    pub fn standard_accounts() -> Vec<Account> {
        STANDARD_ACCOUNTS.clone()
    }

    /// One standard account by number
    pub fn account(number: &str) -> Account {
        STANDARD_ACCOUNTS
            .iter()
            .find(|a| a.number == number)
            .cloned()
            .unwrap_or_else(|| panic!("{number} is not in the standard chart"))
    }
}

/// Fixture for commercial master data
pub struct CommerceFixtures;

impl CommerceFixtures {
    pub fn client() -> ClientSnapshot {
        ClientSnapshot::new(IdFixtures::client_id(), "Dupont SARL")
            .with_email("compta@dupont.fr")
            .with_address("12 rue des Lilas, 69003 Lyon")
    }

    pub fn supplier() -> SupplierSnapshot {
        SupplierSnapshot::new(IdFixtures::supplier_id(), "Grossiste Martin")
    }

    /// Physical product: a table at 100 € HT, 20 % VAT
    pub fn table() -> ProductSnapshot {
        ProductSnapshot {
            product_id: IdFixtures::product_id(),
            reference: "TAB-001".into(),
            name: "Table chêne".into(),
            unit_price: Money::eur(dec!(100)),
            vat_rate: Percentage::VAT_STANDARD,
            is_service: false,
        }
    }

    /// Service: an hour of installation at 50 € HT, 20 % VAT
    pub fn installation() -> ProductSnapshot {
        ProductSnapshot {
            product_id: IdFixtures::service_product_id(),
            reference: "SRV-INST".into(),
            name: "Installation (heure)".into(),
            unit_price: Money::eur(dec!(50)),
            vat_rate: Percentage::VAT_STANDARD,
            is_service: true,
        }
    }

    /// 10 tables: 1 000 € HT, 200 € VAT, 1 200 € TTC
    pub fn ten_tables() -> Vec<LineItem> {
        vec![LineItem::from_product(&Self::table(), dec!(10))]
    }

    /// Stock record of the table product
    pub fn table_stock(quantity: Decimal, threshold: Decimal) -> StockItem {
        let product = Self::table();
        StockItem::new(product.product_id, product.reference, product.name)
            .with_quantity(quantity)
            .with_threshold(threshold)
    }

    /// Stock record of the installation service
    pub fn installation_stock() -> StockItem {
        let product = Self::installation();
        StockItem::new(product.product_id, product.reference, product.name).service()
    }
}
