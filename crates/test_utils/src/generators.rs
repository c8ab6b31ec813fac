//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating ledger amounts and rent
//! breakdowns that satisfy the domain constructors.

use chrono::{Duration, NaiveDate};
use core_kernel::{Currency, Money};
use domain_receivables::{ChargeComponent, WaterfallPriority};
use proptest::prelude::*;

/// Strategy for positive EUR amounts in cents, up to 100 000.00
pub fn positive_eur_strategy() -> impl Strategy<Value = Money> {
    (1i64..10_000_000i64).prop_map(|cents| Money::from_minor(cents, Currency::EUR))
}

/// Strategy for non-negative EUR amounts in cents, up to 5 000.00
pub fn component_amount_strategy() -> impl Strategy<Value = Money> {
    (0i64..500_000i64).prop_map(|cents| Money::from_minor(cents, Currency::EUR))
}

/// Strategy for a full rent breakdown with a positive total
pub fn rent_components_strategy() -> impl Strategy<Value = Vec<(ChargeComponent, Money)>> {
    (
        component_amount_strategy(),
        component_amount_strategy(),
        1i64..500_000i64,
    )
        .prop_map(|(utility, heating, cold_cents)| {
            vec![
                (ChargeComponent::ColdRent, Money::from_minor(cold_cents, Currency::EUR)),
                (ChargeComponent::UtilityAdvance, utility),
                (ChargeComponent::HeatingAdvance, heating),
            ]
        })
}

/// Strategy for any valid waterfall priority
pub fn waterfall_priority_strategy() -> impl Strategy<Value = WaterfallPriority> {
    Just(ChargeComponent::ALL.to_vec())
        .prop_shuffle()
        .prop_filter_map("permutation of all components", |order| {
            WaterfallPriority::new(order).ok()
        })
}

/// Strategy for splitting `total_cents` into `1..=max_parts` positive parts
///
/// The parts always sum to `total_cents`; `total_cents` must be at least
/// `max_parts`.
pub fn partition_strategy(total_cents: i64, max_parts: usize) -> impl Strategy<Value = Vec<i64>> {
    let upper = max_parts.max(1);
    (1usize..=upper).prop_flat_map(move |parts| {
        proptest::collection::btree_set(1i64..total_cents, parts - 1).prop_map(move |cuts| {
            let mut result = Vec::with_capacity(cuts.len() + 1);
            let mut previous = 0i64;
            for cut in cuts {
                result.push(cut - previous);
                previous = cut;
            }
            result.push(total_cents - previous);
            result
        })
    })
}

/// Strategy for due dates during 2024
pub fn due_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..366i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default() + Duration::days(offset)
    })
}
