//! Custom Test Assertions
//!
//! Ledger invariant checks with messages that name the offending amounts.

use core_kernel::Money;
use domain_receivables::{Allocation, Charge, ChargeStatus, Payment, PaymentStatus};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts coverage bounds and the derived status of a charge
///
/// Checks `0 ≤ covered ≤ total` overall and per component, that component
/// coverage adds up to the total coverage, and that a non-cancelled status
/// follows from the amounts.
pub fn assert_charge_invariants(charge: &Charge) {
    assert!(
        !charge.covered_total.is_negative() && charge.covered_total <= charge.total,
        "charge {} coverage out of bounds: covered {}, total {}",
        charge.id,
        charge.covered_total,
        charge.total
    );

    if !charge.components.is_empty() {
        let mut covered = Decimal::ZERO;
        for line in &charge.components {
            assert!(
                !line.covered.is_negative() && line.covered <= line.amount,
                "{} of charge {} out of bounds: covered {}, amount {}",
                line.component,
                charge.id,
                line.covered,
                line.amount
            );
            covered += line.covered.amount();
        }
        assert_eq!(
            covered,
            charge.covered_total.amount(),
            "component coverage of charge {} does not add up to its covered total",
            charge.id
        );
    }

    if charge.status != ChargeStatus::Cancelled {
        let expected = if charge.covered_total >= charge.total {
            ChargeStatus::Paid
        } else if charge.covered_total.is_zero() {
            ChargeStatus::Open
        } else {
            ChargeStatus::PartiallyPaid
        };
        assert_eq!(charge.status, expected, "charge {} has a stale status", charge.id);
    }
}

/// Asserts that a payment's totals agree with its live allocations
///
/// Allocations funded from credit balances count as allocated money.
pub fn assert_payment_invariants(payment: &Payment, allocations: &[Allocation]) {
    let allocated: Decimal = allocations.iter().map(|a| a.amount.amount()).sum();
    assert_eq!(
        allocated,
        payment.allocated_total.amount(),
        "payment {} records {} allocated but its allocations sum to {}",
        payment.id,
        payment.allocated_total,
        allocated
    );
    assert!(
        payment.settled() <= payment.amount,
        "payment {} over-settled: {} of {}",
        payment.id,
        payment.settled(),
        payment.amount
    );

    if !matches!(payment.status, PaymentStatus::Bounced | PaymentStatus::Ignored) {
        let settled = payment.settled();
        let consistent = if settled == payment.amount {
            matches!(payment.status, PaymentStatus::Allocated | PaymentStatus::Split)
        } else if settled.is_positive() {
            payment.status == PaymentStatus::PartiallyAllocated
        } else {
            payment.status == PaymentStatus::Unclear
        };
        assert!(
            consistent,
            "payment {} is {} with {} settled of {}",
            payment.id,
            payment.status,
            settled,
            payment.amount
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{ChargeBuilder, PaymentBuilder};
    use crate::fixtures::eur;
    use core_kernel::TenantId;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq() {
        assert_money_approx_eq(&eur(dec!(10.001)), &eur(dec!(10.00)), dec!(0.01));
    }

    #[test]
    fn test_fresh_rows_satisfy_invariants() {
        let tenant = TenantId::new();
        assert_charge_invariants(&ChargeBuilder::new(tenant).build());
        assert_payment_invariants(&PaymentBuilder::new(tenant).build(), &[]);
    }

    #[test]
    #[should_panic(expected = "stale status")]
    fn test_detects_stale_charge_status() {
        let mut charge = ChargeBuilder::new(TenantId::new()).build();
        charge.status = ChargeStatus::Paid;
        assert_charge_invariants(&charge);
    }
}
