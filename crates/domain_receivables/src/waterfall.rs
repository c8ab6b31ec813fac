//! Component waterfall
//!
//! A payment applied to a recurring-rent charge is spread over the charge's
//! components in a fixed priority order: each component absorbs as much as
//! it still owes before the remainder moves on to the next one. The default
//! order settles the advances (utility, then heating) before the cold rent.
//!
//! [`apply_waterfall`] is a pure function; the allocation engine applies
//! its result to the charge.

use serde::{Deserialize, Serialize};

use core_kernel::Money;

use crate::charge::ChargeComponent;
use crate::error::{ReceivablesError, ReceivablesResult};

/// The part of an allocation that landed on one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentShare {
    pub component: ChargeComponent,
    pub amount: Money,
}

impl ComponentShare {
    pub fn new(component: ChargeComponent, amount: Money) -> Self {
        Self { component, amount }
    }
}

/// Order in which components absorb an amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChargeComponent>", into = "Vec<ChargeComponent>")]
pub struct WaterfallPriority(Vec<ChargeComponent>);

impl WaterfallPriority {
    /// Creates a priority order
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `order` names every component exactly once
    pub fn new(order: Vec<ChargeComponent>) -> ReceivablesResult<Self> {
        let is_permutation = order.len() == ChargeComponent::ALL.len()
            && ChargeComponent::ALL.iter().all(|c| order.contains(c));
        if !is_permutation {
            return Err(ReceivablesError::validation(format!(
                "waterfall priority must name each of {:?} exactly once, got {:?}",
                ChargeComponent::ALL,
                order
            )));
        }
        Ok(Self(order))
    }

    pub fn components(&self) -> &[ChargeComponent] {
        &self.0
    }
}

impl Default for WaterfallPriority {
    fn default() -> Self {
        Self(vec![
            ChargeComponent::UtilityAdvance,
            ChargeComponent::HeatingAdvance,
            ChargeComponent::ColdRent,
        ])
    }
}

impl TryFrom<Vec<ChargeComponent>> for WaterfallPriority {
    type Error = ReceivablesError;

    fn try_from(order: Vec<ChargeComponent>) -> Result<Self, Self::Error> {
        Self::new(order)
    }
}

impl From<WaterfallPriority> for Vec<ChargeComponent> {
    fn from(priority: WaterfallPriority) -> Self {
        priority.0
    }
}

/// Spreads `amount` over the outstanding components in priority order
///
/// # Arguments
///
/// * `outstanding` - What each component still owes
/// * `amount` - The amount to apply
/// * `priority` - Absorption order
///
/// # Returns
///
/// One share per outstanding component, in priority order; components that
/// absorbed nothing carry a zero share.
///
/// # Errors
///
/// * `Validation` for a negative amount
/// * `ComputationInvariantViolation` when the components cannot absorb the
///   whole amount; money is never silently dropped
pub fn apply_waterfall(
    outstanding: &[(ChargeComponent, Money)],
    amount: Money,
    priority: &WaterfallPriority,
) -> ReceivablesResult<Vec<ComponentShare>> {
    if amount.is_negative() {
        return Err(ReceivablesError::validation(format!(
            "cannot apply a negative amount ({}) to components",
            amount
        )));
    }

    let mut remaining = amount;
    let mut shares = Vec::with_capacity(outstanding.len());

    for component in priority.components() {
        let Some((_, owed)) = outstanding.iter().find(|(c, _)| c == component) else {
            continue;
        };
        let owed = if owed.is_negative() { Money::zero(owed.currency()) } else { *owed };
        let absorbed = remaining.checked_min(&owed)?;
        remaining = remaining.checked_sub(&absorbed)?;
        shares.push(ComponentShare::new(*component, absorbed));
    }

    if !remaining.is_zero() {
        return Err(ReceivablesError::invariant(format!(
            "waterfall left {} of {} unabsorbed",
            remaining, amount
        )));
    }

    Ok(shares)
}
