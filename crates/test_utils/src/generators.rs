//! Property-Based Test Generators
//!
//! Proptest strategies for generating ledger data that respects domain
//! invariants, plus `fake`-based master data.

use chrono::{Duration, NaiveDate};
use core_kernel::{ClientId, Money, Percentage};
use domain_accounting::ManualLine;
use domain_commerce::{ClientSnapshot, LineItem};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for the French VAT rates
pub fn vat_rate_strategy() -> impl Strategy<Value = Percentage> {
    prop_oneof![
        Just(Percentage::ZERO),
        Just(Percentage::VAT_SUPER_REDUCED),
        Just(Percentage::VAT_REDUCED),
        Just(Percentage::VAT_INTERMEDIATE),
        Just(Percentage::VAT_STANDARD),
    ]
}

/// Strategy for positive amounts with two decimals (0.01 to 100 000.00)
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for euro unit prices
pub fn eur_price_strategy() -> impl Strategy<Value = Money> {
    positive_amount_strategy().prop_map(Money::eur)
}

/// Strategy for line quantities, whole or with up to three decimals
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (1i64..1_000i64).prop_map(Decimal::from),
        (1i64..1_000_000i64).prop_map(|m| Decimal::new(m, 3)),
    ]
}

/// Strategy for discounts between 0 % and 50 %, whole percents
pub fn discount_strategy() -> impl Strategy<Value = Percentage> {
    (0u32..=50u32).prop_map(|p| Percentage::new(Decimal::from(p)).expect("within 0..=100"))
}

/// Strategy for a priced line item
pub fn line_item_strategy() -> impl Strategy<Value = LineItem> {
    (
        quantity_strategy(),
        eur_price_strategy(),
        vat_rate_strategy(),
        discount_strategy(),
        any::<bool>(),
    )
        .prop_map(|(quantity, price, vat, discount, is_service)| {
            let item = LineItem::new("Article", quantity, price, vat).with_discount(discount);
            if is_service {
                item.as_service()
            } else {
                item
            }
        })
}

/// Strategy for the lines of one document
pub fn line_items_strategy(max: usize) -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(line_item_strategy(), 1..=max)
}

/// Strategy for dates in 2024
pub fn date_2024_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..366i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date") + Duration::days(offset)
    })
}

/// Strategy for balanced manual lines over the given accounts
///
/// Each generated amount becomes a debit on one account and a credit on
/// another, so the result always balances.
pub fn balanced_manual_lines_strategy(accounts: Vec<String>) -> impl Strategy<Value = Vec<ManualLine>> {
    let count = accounts.len();
    proptest::collection::vec((0..count, 0..count, positive_amount_strategy()), 1..5).prop_map(move |legs| {
        legs.into_iter()
            .flat_map(|(d, c, amount)| {
                let credit_index = if d == c { (c + 1) % count } else { c };
                [
                    ManualLine {
                        account_number: accounts[d].clone(),
                        description: None,
                        debit: amount,
                        credit: Decimal::ZERO,
                    },
                    ManualLine {
                        account_number: accounts[credit_index].clone(),
                        description: None,
                        debit: Decimal::ZERO,
                        credit: amount,
                    },
                ]
            })
            .collect()
    })
}

/// A client with a generated company name and email
pub fn random_client() -> ClientSnapshot {
    let name: String = CompanyName().fake();
    let email: String = SafeEmail().fake();
    ClientSnapshot::new(ClientId::new(), name).with_email(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_manual_lines_balance(
            lines in balanced_manual_lines_strategy(vec!["512000".into(), "530000".into()])
        ) {
            let debit: Decimal = lines.iter().map(|l| l.debit).sum();
            let credit: Decimal = lines.iter().map(|l| l.credit).sum();
            prop_assert_eq!(debit, credit);
        }

        #[test]
        fn test_line_items_are_valid(item in line_item_strategy()) {
            prop_assert!(item.validate().is_ok());
        }
    }

    #[test]
    fn test_random_client_is_valid() {
        use validator::Validate;
        assert!(random_client().validate().is_ok());
    }
}
