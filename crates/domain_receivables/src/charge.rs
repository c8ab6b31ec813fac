//! Charges: the billable line items owed by a contract
//!
//! A charge is created by contract billing (outside this crate), by the
//! dunning engine (late fees, default interest) or by the chargeback path.
//! Its coverage is only ever changed through [`Charge::apply_coverage`] and
//! [`Charge::remove_coverage`], which keep
//! `0 ≤ covered_total ≤ total` and the per-component bounds intact and
//! re-derive the status after every mutation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ChargeId, ContractId, Currency, DunningNoticeId, Money, PaymentId, TenantId};

use crate::error::{ReceivablesError, ReceivablesResult};
use crate::waterfall::ComponentShare;

/// Kind of charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeType {
    RecurringRent,
    Deposit,
    UtilitySettlement,
    LateFee,
    Interest,
    Other,
}

/// Settlement state of a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Open,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl ChargeStatus {
    /// Statuses that still expect money
    pub const OPEN_STATES: [ChargeStatus; 2] = [ChargeStatus::Open, ChargeStatus::PartiallyPaid];

    pub fn is_open(&self) -> bool {
        matches!(self, ChargeStatus::Open | ChargeStatus::PartiallyPaid)
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeStatus::Open => "OPEN",
            ChargeStatus::PartiallyPaid => "PARTIALLY_PAID",
            ChargeStatus::Paid => "PAID",
            ChargeStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Named part of a recurring-rent charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeComponent {
    ColdRent,
    UtilityAdvance,
    HeatingAdvance,
}

impl ChargeComponent {
    pub const ALL: [ChargeComponent; 3] = [
        ChargeComponent::ColdRent,
        ChargeComponent::UtilityAdvance,
        ChargeComponent::HeatingAdvance,
    ];
}

impl fmt::Display for ChargeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeComponent::ColdRent => "cold_rent",
            ChargeComponent::UtilityAdvance => "utility_advance",
            ChargeComponent::HeatingAdvance => "heating_advance",
        };
        f.write_str(s)
    }
}

/// One component of a charge with its own covered amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLine {
    pub component: ChargeComponent,
    pub amount: Money,
    pub covered: Money,
}

impl ComponentLine {
    pub fn outstanding(&self) -> Money {
        Money::new(self.amount.amount() - self.covered.amount(), self.amount.currency())
    }
}

/// Which part of a dunning notice a charge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeChargeKind {
    LateFee,
    Interest,
}

/// Link from a generated charge back to the event that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeOrigin {
    DunningNotice {
        notice_id: DunningNoticeId,
        kind: NoticeChargeKind,
    },
    Chargeback {
        payment_id: PaymentId,
        charge_id: ChargeId,
    },
}

/// A billable line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: ChargeId,
    pub tenant_id: TenantId,
    pub contract_id: Option<ContractId>,
    pub charge_type: ChargeType,
    pub title: String,
    pub total: Money,
    /// Only populated for recurring rent
    pub components: Vec<ComponentLine>,
    pub due_date: NaiveDate,
    pub covered_total: Money,
    pub status: ChargeStatus,
    pub origin: Option<ChargeOrigin>,
    /// Optimistic concurrency counter, bumped by the store on every update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    /// Creates a flat charge (fee, interest, deposit, ...)
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `total` is not positive
    pub fn new(
        tenant_id: TenantId,
        contract_id: Option<ContractId>,
        charge_type: ChargeType,
        title: impl Into<String>,
        total: Money,
        due_date: NaiveDate,
    ) -> ReceivablesResult<Self> {
        if !total.is_positive() {
            return Err(ReceivablesError::validation(format!(
                "charge total must be positive, got {}",
                total
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: ChargeId::new_v7(),
            tenant_id,
            contract_id,
            charge_type,
            title: title.into(),
            total,
            components: Vec::new(),
            due_date,
            covered_total: Money::zero(total.currency()),
            status: ChargeStatus::Open,
            origin: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates a recurring-rent charge whose total is the sum of its components
    ///
    /// # Arguments
    ///
    /// * `components` - Component amounts; each component at most once
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or duplicated breakdown, negative
    /// component amounts, mixed currencies or a non-positive total
    pub fn recurring_rent(
        tenant_id: TenantId,
        contract_id: ContractId,
        title: impl Into<String>,
        due_date: NaiveDate,
        components: Vec<(ChargeComponent, Money)>,
    ) -> ReceivablesResult<Self> {
        let Some((_, first)) = components.first() else {
            return Err(ReceivablesError::validation(
                "recurring rent needs at least one component",
            ));
        };
        let currency = first.currency();

        let mut lines: Vec<ComponentLine> = Vec::with_capacity(components.len());
        for (component, amount) in components {
            if lines.iter().any(|l| l.component == component) {
                return Err(ReceivablesError::validation(format!(
                    "component {} listed twice",
                    component
                )));
            }
            if amount.is_negative() {
                return Err(ReceivablesError::validation(format!(
                    "component {} must not be negative, got {}",
                    component, amount
                )));
            }
            lines.push(ComponentLine {
                component,
                amount,
                covered: Money::zero(currency),
            });
        }

        let amounts: Vec<Money> = lines.iter().map(|l| l.amount).collect();
        let total = Money::sum(&amounts, currency)?;

        let mut charge = Self::new(
            tenant_id,
            Some(contract_id),
            ChargeType::RecurringRent,
            title,
            total,
            due_date,
        )?;
        charge.components = lines;
        Ok(charge)
    }

    /// Sets the origin reference
    pub fn with_origin(mut self, origin: ChargeOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn currency(&self) -> Currency {
        self.total.currency()
    }

    /// Total minus covered
    pub fn outstanding(&self) -> Money {
        Money::new(
            self.total.amount() - self.covered_total.amount(),
            self.currency(),
        )
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// True when allocations are spread over components by the waterfall
    pub fn uses_waterfall(&self) -> bool {
        self.charge_type == ChargeType::RecurringRent && !self.components.is_empty()
    }

    /// Outstanding amount per component, in stored order
    pub fn outstanding_components(&self) -> Vec<(ChargeComponent, Money)> {
        self.components
            .iter()
            .map(|l| (l.component, l.outstanding()))
            .collect()
    }

    /// Returns the covered amount of one component, if the charge has it
    pub fn covered_component(&self, component: ChargeComponent) -> Option<Money> {
        self.components
            .iter()
            .find(|l| l.component == component)
            .map(|l| l.covered)
    }

    /// Adds coverage to the total and to the given components
    ///
    /// # Errors
    ///
    /// Returns `ComputationInvariantViolation` if the result would exceed the
    /// charge total or a component amount, or if the component shares do not
    /// add up to `amount`. Nothing is changed on error.
    pub fn apply_coverage(
        &mut self,
        amount: Money,
        shares: &[ComponentShare],
    ) -> ReceivablesResult<()> {
        self.change_coverage(amount, shares, CoverageChange::Add)
    }

    /// Removes coverage previously applied with [`Charge::apply_coverage`]
    ///
    /// # Errors
    ///
    /// Returns `ComputationInvariantViolation` if the total or any component
    /// would drop below zero. Nothing is changed on error.
    pub fn remove_coverage(
        &mut self,
        amount: Money,
        shares: &[ComponentShare],
    ) -> ReceivablesResult<()> {
        self.change_coverage(amount, shares, CoverageChange::Remove)
    }

    fn change_coverage(
        &mut self,
        amount: Money,
        shares: &[ComponentShare],
        change: CoverageChange,
    ) -> ReceivablesResult<()> {
        if !shares.is_empty() {
            let share_amounts: Vec<Money> = shares.iter().map(|s| s.amount).collect();
            let share_sum = Money::sum(&share_amounts, self.currency())?;
            if share_sum != amount {
                return Err(ReceivablesError::invariant(format!(
                    "component shares of {} sum to {}, expected {}",
                    self.id, share_sum, amount
                )));
            }
        }

        let new_total = match change {
            CoverageChange::Add => self.covered_total.checked_add(&amount)?,
            CoverageChange::Remove => self.covered_total.checked_sub(&amount)?,
        };
        if new_total.is_negative() {
            return Err(ReceivablesError::invariant(format!(
                "reversal would drive covered total of {} below zero: covered {}, removing {}",
                self.id, self.covered_total, amount
            )));
        }
        if new_total > self.total {
            return Err(ReceivablesError::invariant(format!(
                "coverage of {} would exceed its total: covered {}, adding {}, total {}",
                self.id, self.covered_total, amount, self.total
            )));
        }

        let mut lines = self.components.clone();
        for share in shares {
            let Some(line) = lines.iter_mut().find(|l| l.component == share.component) else {
                return Err(ReceivablesError::invariant(format!(
                    "charge {} has no {} component",
                    self.id, share.component
                )));
            };
            let covered = match change {
                CoverageChange::Add => line.covered.checked_add(&share.amount)?,
                CoverageChange::Remove => line.covered.checked_sub(&share.amount)?,
            };
            if covered.is_negative() || covered > line.amount {
                return Err(ReceivablesError::invariant(format!(
                    "{} of {} would leave its bounds: covered {}, change {}, amount {}",
                    share.component, self.id, line.covered, share.amount, line.amount
                )));
            }
            line.covered = covered;
        }

        self.covered_total = new_total;
        self.components = lines;
        self.refresh_status();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-derives the status from coverage; a cancelled charge stays cancelled
    pub fn refresh_status(&mut self) {
        if self.status == ChargeStatus::Cancelled {
            return;
        }
        self.status = if self.covered_total >= self.total {
            ChargeStatus::Paid
        } else if self.covered_total.is_zero() {
            ChargeStatus::Open
        } else {
            ChargeStatus::PartiallyPaid
        };
    }

    /// Cancels the charge without touching its coverage
    ///
    /// Returns `false` if the charge was already cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status == ChargeStatus::Cancelled {
            return false;
        }
        self.status = ChargeStatus::Cancelled;
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum CoverageChange {
    Add,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::EUR)
    }

    fn rent() -> Charge {
        Charge::recurring_rent(
            TenantId::new(),
            ContractId::new(),
            "Rent January",
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            vec![
                (ChargeComponent::ColdRent, eur(dec!(800))),
                (ChargeComponent::UtilityAdvance, eur(dec!(100))),
                (ChargeComponent::HeatingAdvance, eur(dec!(50))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_recurring_rent_total_is_component_sum() {
        let charge = rent();
        assert_eq!(charge.total, eur(dec!(950)));
        assert_eq!(charge.status, ChargeStatus::Open);
        assert!(charge.uses_waterfall());
    }

    #[test]
    fn test_duplicate_component_is_rejected() {
        let result = Charge::recurring_rent(
            TenantId::new(),
            ContractId::new(),
            "Rent",
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            vec![
                (ChargeComponent::ColdRent, eur(dec!(800))),
                (ChargeComponent::ColdRent, eur(dec!(100))),
            ],
        );
        assert!(matches!(result, Err(ReceivablesError::Validation(_))));
    }

    #[test]
    fn test_status_follows_coverage() {
        let mut charge = Charge::new(
            TenantId::new(),
            None,
            ChargeType::Deposit,
            "Deposit",
            eur(dec!(300)),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();

        charge.apply_coverage(eur(dec!(100)), &[]).unwrap();
        assert_eq!(charge.status, ChargeStatus::PartiallyPaid);

        charge.apply_coverage(eur(dec!(200)), &[]).unwrap();
        assert_eq!(charge.status, ChargeStatus::Paid);
        assert!(charge.outstanding().is_zero());

        charge.remove_coverage(eur(dec!(300)), &[]).unwrap();
        assert_eq!(charge.status, ChargeStatus::Open);
    }

    #[test]
    fn test_over_reversal_is_an_invariant_violation_and_changes_nothing() {
        let mut charge = rent();
        charge
            .apply_coverage(
                eur(dec!(100)),
                &[ComponentShare::new(ChargeComponent::UtilityAdvance, eur(dec!(100)))],
            )
            .unwrap();
        let before = charge.clone();

        let result = charge.remove_coverage(
            eur(dec!(150)),
            &[ComponentShare::new(ChargeComponent::UtilityAdvance, eur(dec!(150)))],
        );
        assert!(matches!(result, Err(ReceivablesError::ComputationInvariantViolation(_))));
        assert_eq!(charge, before);
    }

    #[test]
    fn test_cancel_keeps_coverage_and_is_sticky() {
        let mut charge = rent();
        charge
            .apply_coverage(
                eur(dec!(50)),
                &[ComponentShare::new(ChargeComponent::HeatingAdvance, eur(dec!(50)))],
            )
            .unwrap();

        assert!(charge.cancel());
        assert!(!charge.cancel());
        assert_eq!(charge.covered_total, eur(dec!(50)));

        charge.refresh_status();
        assert_eq!(charge.status, ChargeStatus::Cancelled);
    }
}
