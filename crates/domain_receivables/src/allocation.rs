//! Allocations and the ledger arithmetic behind them
//!
//! An allocation links one payment to one charge. The functions here mutate
//! working copies of the affected rows; services collect the results in a
//! [`LedgerChangeSet`](crate::store::LedgerChangeSet) and commit them in
//! one unit, so a failure half-way leaves the stored ledger untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    ActorId, AllocationId, ChargeId, CreditBalanceId, Money, MoneyError, PaymentId, TenantId,
};

use crate::charge::{Charge, ChargeStatus};
use crate::credit::CreditBalance;
use crate::error::{ReceivablesError, ReceivablesResult};
use crate::match_rules::MatchRuleKind;
use crate::payment::Payment;
use crate::waterfall::{apply_waterfall, ComponentShare, WaterfallPriority};

/// How an allocation came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationSource {
    Manual,
    Split,
    AutoMatch { rule: MatchRuleKind },
    CreditBalance { credit_id: CreditBalanceId },
}

/// Money from one payment applied to one charge
///
/// Immutable once created; reversal deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub charge_id: ChargeId,
    pub amount: Money,
    /// Per-component split; empty for charges without components
    pub components: Vec<ComponentShare>,
    pub source: AllocationSource,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

/// Who allocates, how, and when
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    pub amount: Money,
    pub priority: &'a WaterfallPriority,
    pub source: AllocationSource,
    pub actor: Option<ActorId>,
    pub at: DateTime<Utc>,
}

/// Applies `request.amount` of `payment` to `charge`
///
/// Checks, in order: positive amount, payment allocatable, charge not
/// cancelled, enough unallocated money on the payment, enough outstanding
/// on the charge. Recurring-rent charges spread the amount with the
/// waterfall; all other charges only change their total coverage.
///
/// # Errors
///
/// * `Validation`, `InsufficientPaymentBalance`, `ExceedsOutstandingCharge`
/// * `PreconditionFailed` for bounced/ignored payments or cancelled charges
/// * `ComputationInvariantViolation` if the arithmetic does not close
pub fn allocate_in_place(
    payment: &mut Payment,
    charge: &mut Charge,
    request: AllocationRequest<'_>,
) -> ReceivablesResult<Allocation> {
    ensure_same_tenant(payment, charge)?;
    ensure_positive(request.amount)?;
    ensure_currency(request.amount, payment, charge)?;
    payment.ensure_allocatable()?;
    ensure_charge_allocatable(charge)?;

    let available = payment.unallocated();
    if request.amount > available {
        return Err(ReceivablesError::InsufficientPaymentBalance {
            payment_id: payment.id,
            requested: request.amount,
            available,
            shortfall: request.amount.checked_sub(&available)?,
        });
    }

    let mut working_charge = charge.clone();
    let mut working_payment = payment.clone();
    let shares = cover_charge(&mut working_charge, request.amount, request.priority)?;
    working_payment.record_allocation(request.amount, request.at)?;

    *charge = working_charge;
    *payment = working_payment;
    Ok(new_allocation(payment, charge, request, shares))
}

/// Applies part of a credit balance to a charge of the same contract
///
/// The allocation is booked against the credit's originating payment and
/// moves that amount from the payment's credited to its allocated total.
///
/// # Errors
///
/// * `PreconditionFailed` for a consumed credit, a charge on another
///   contract, a cancelled charge or an unusable payment
/// * `Validation` / `ExceedsOutstandingCharge` for amounts that do not fit
pub fn apply_credit_in_place(
    credit: &mut CreditBalance,
    payment: &mut Payment,
    charge: &mut Charge,
    request: AllocationRequest<'_>,
) -> ReceivablesResult<Allocation> {
    ensure_same_tenant(payment, charge)?;
    ensure_positive(request.amount)?;
    ensure_currency(request.amount, payment, charge)?;
    if credit.payment_id != payment.id {
        return Err(ReceivablesError::invariant(format!(
            "credit balance {} belongs to {}, not {}",
            credit.id, credit.payment_id, payment.id
        )));
    }
    if charge.contract_id != Some(credit.contract_id) {
        return Err(ReceivablesError::precondition(format!(
            "credit balance {} is held for contract {} and cannot settle {} of another contract",
            credit.id, credit.contract_id, charge.id
        )));
    }
    payment.ensure_allocatable()?;
    ensure_charge_allocatable(charge)?;

    let mut working_credit = credit.clone();
    let mut working_charge = charge.clone();
    let mut working_payment = payment.clone();

    working_credit.consume(request.amount)?;
    let shares = cover_charge(&mut working_charge, request.amount, request.priority)?;
    working_payment.apply_credit(request.amount, request.at)?;

    *credit = working_credit;
    *charge = working_charge;
    *payment = working_payment;
    Ok(new_allocation(payment, charge, request, shares))
}

/// Takes an allocation back out of its payment and charge
///
/// Credit-funded allocations return their amount to `credit`, which must
/// then be the credit balance named by the allocation source.
///
/// # Errors
///
/// Returns `ComputationInvariantViolation` if any covered or allocated
/// amount would go negative. Nothing is changed on error.
pub fn reverse_in_place(
    allocation: &Allocation,
    payment: &mut Payment,
    charge: &mut Charge,
    credit: Option<&mut CreditBalance>,
) -> ReceivablesResult<()> {
    if allocation.payment_id != payment.id || allocation.charge_id != charge.id {
        return Err(ReceivablesError::invariant(format!(
            "allocation {} does not link {} and {}",
            allocation.id, payment.id, charge.id
        )));
    }

    let mut working_charge = charge.clone();
    let mut working_payment = payment.clone();
    working_charge.remove_coverage(allocation.amount, &allocation.components)?;

    match (allocation.source, credit) {
        (AllocationSource::CreditBalance { credit_id }, Some(credit)) if credit.id == credit_id => {
            let mut working_credit = credit.clone();
            working_payment.restore_credit(allocation.amount)?;
            working_credit.restore(allocation.amount)?;
            *credit = working_credit;
        }
        (AllocationSource::CreditBalance { credit_id }, _) => {
            return Err(ReceivablesError::invariant(format!(
                "reversing {} requires its credit balance {}",
                allocation.id, credit_id
            )));
        }
        _ => working_payment.release_allocation(allocation.amount)?,
    }

    *charge = working_charge;
    *payment = working_payment;
    Ok(())
}

fn cover_charge(
    charge: &mut Charge,
    amount: Money,
    priority: &WaterfallPriority,
) -> ReceivablesResult<Vec<ComponentShare>> {
    let outstanding = charge.outstanding();
    if amount > outstanding {
        return Err(ReceivablesError::ExceedsOutstandingCharge {
            charge_id: charge.id,
            requested: amount,
            outstanding,
            excess: amount.checked_sub(&outstanding)?,
        });
    }

    let shares = if charge.uses_waterfall() {
        apply_waterfall(&charge.outstanding_components(), amount, priority)?
    } else {
        Vec::new()
    };
    charge.apply_coverage(amount, &shares)?;
    Ok(shares)
}

fn new_allocation(
    payment: &Payment,
    charge: &Charge,
    request: AllocationRequest<'_>,
    shares: Vec<ComponentShare>,
) -> Allocation {
    Allocation {
        id: AllocationId::new_v7(),
        tenant_id: payment.tenant_id,
        payment_id: payment.id,
        charge_id: charge.id,
        amount: request.amount,
        components: shares,
        source: request.source,
        created_by: request.actor,
        created_at: request.at,
    }
}

fn ensure_positive(amount: Money) -> ReceivablesResult<()> {
    if !amount.is_positive() {
        return Err(ReceivablesError::validation(format!(
            "allocation amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn ensure_charge_allocatable(charge: &Charge) -> ReceivablesResult<()> {
    if charge.status == ChargeStatus::Cancelled {
        return Err(ReceivablesError::precondition(format!(
            "charge {} is cancelled",
            charge.id
        )));
    }
    Ok(())
}

fn ensure_currency(amount: Money, payment: &Payment, charge: &Charge) -> ReceivablesResult<()> {
    for other in [payment.currency(), charge.currency()] {
        if amount.currency() != other {
            return Err(
                MoneyError::CurrencyMismatch(amount.currency().to_string(), other.to_string())
                    .into(),
            );
        }
    }
    Ok(())
}

fn ensure_same_tenant(payment: &Payment, charge: &Charge) -> ReceivablesResult<()> {
    if payment.tenant_id != charge.tenant_id {
        return Err(ReceivablesError::not_found("Charge", charge.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::{ChargeComponent, ChargeType};
    use crate::payment::PaymentStatus;
    use chrono::NaiveDate;
    use core_kernel::{ContractId, Currency};
    use rust_decimal_macros::dec;

    fn eur(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::EUR)
    }

    fn request(amount: Money, priority: &WaterfallPriority) -> AllocationRequest<'_> {
        AllocationRequest {
            amount,
            priority,
            source: AllocationSource::Manual,
            actor: None,
            at: Utc::now(),
        }
    }

    fn fixtures() -> (Payment, Charge) {
        let tenant = TenantId::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let payment = Payment::new(tenant, date, eur(dec!(500)), "rent").unwrap();
        let charge = Charge::recurring_rent(
            tenant,
            ContractId::new(),
            "Rent January",
            date,
            vec![
                (ChargeComponent::ColdRent, eur(dec!(800))),
                (ChargeComponent::UtilityAdvance, eur(dec!(100))),
                (ChargeComponent::HeatingAdvance, eur(dec!(50))),
            ],
        )
        .unwrap();
        (payment, charge)
    }

    #[test]
    fn test_allocate_then_reverse_restores_both_rows() {
        let priority = WaterfallPriority::default();
        let (mut payment, mut charge) = fixtures();
        let (payment_before, charge_before) = (payment.clone(), charge.clone());

        let allocation =
            allocate_in_place(&mut payment, &mut charge, request(eur(dec!(120)), &priority))
                .unwrap();
        assert_eq!(charge.status, ChargeStatus::PartiallyPaid);
        assert_eq!(payment.status, PaymentStatus::PartiallyAllocated);

        reverse_in_place(&allocation, &mut payment, &mut charge, None).unwrap();

        assert_eq!(charge.covered_total, charge_before.covered_total);
        assert_eq!(charge.components, charge_before.components);
        assert_eq!(charge.status, charge_before.status);
        assert_eq!(payment.allocated_total, payment_before.allocated_total);
        assert_eq!(payment.status, payment_before.status);
    }

    #[test]
    fn test_insufficient_balance_states_shortfall_and_changes_nothing() {
        let priority = WaterfallPriority::default();
        let (mut payment, mut charge) = fixtures();
        let (payment_before, charge_before) = (payment.clone(), charge.clone());

        let err = allocate_in_place(&mut payment, &mut charge, request(eur(dec!(600)), &priority))
            .unwrap_err();

        match err {
            ReceivablesError::InsufficientPaymentBalance { shortfall, available, .. } => {
                assert_eq!(shortfall, eur(dec!(100)));
                assert_eq!(available, eur(dec!(500)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(payment, payment_before);
        assert_eq!(charge, charge_before);
    }

    #[test]
    fn test_exceeding_outstanding_is_rejected() {
        let priority = WaterfallPriority::default();
        let tenant = TenantId::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let mut payment = Payment::new(tenant, date, eur(dec!(100)), "fee").unwrap();
        let mut charge =
            Charge::new(tenant, None, ChargeType::LateFee, "Late fee", eur(dec!(5)), date).unwrap();

        let err = allocate_in_place(&mut payment, &mut charge, request(eur(dec!(10)), &priority))
            .unwrap_err();

        assert!(matches!(
            err,
            ReceivablesError::ExceedsOutstandingCharge { excess, .. } if excess == eur(dec!(5))
        ));
    }

    #[test]
    fn test_cancelled_charge_cannot_be_allocated() {
        let priority = WaterfallPriority::default();
        let (mut payment, mut charge) = fixtures();
        charge.cancel();

        let err = allocate_in_place(&mut payment, &mut charge, request(eur(dec!(10)), &priority))
            .unwrap_err();
        assert!(matches!(err, ReceivablesError::PreconditionFailed(_)));
    }

    #[test]
    fn test_cross_tenant_charge_looks_missing() {
        let priority = WaterfallPriority::default();
        let (mut payment, _) = fixtures();
        let (_, mut foreign) = fixtures();

        let err =
            allocate_in_place(&mut payment, &mut foreign, request(eur(dec!(10)), &priority))
                .unwrap_err();
        assert!(matches!(err, ReceivablesError::NotFound { .. }));
    }
}
