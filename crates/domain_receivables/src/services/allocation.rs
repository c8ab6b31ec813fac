//! Allocation engine: allocate, reverse, split, credit application and
//! charge lifecycle

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::{AllocationId, ChargeId, CreditBalanceId, Money, PaymentId};

use crate::allocation::{
    allocate_in_place, apply_credit_in_place, reverse_in_place, Allocation, AllocationRequest,
    AllocationSource,
};
use crate::audit::{emit, AuditAction, AuditEvent, AuditSink};
use crate::charge::Charge;
use crate::context::RequestContext;
use crate::error::{ReceivablesError, ReceivablesResult};
use crate::store::{LedgerChangeSet, LedgerStore};
use crate::waterfall::WaterfallPriority;

/// One part of a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPart {
    pub charge_id: ChargeId,
    pub amount: Money,
}

impl SplitPart {
    pub fn new(charge_id: ChargeId, amount: Money) -> Self {
        Self { charge_id, amount }
    }
}

/// Applies payment money to charges
pub struct AllocationService {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    priority: WaterfallPriority,
}

impl AllocationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        priority: WaterfallPriority,
    ) -> Self {
        Self { store, audit, priority }
    }

    /// Allocates `amount` of a payment to a charge
    ///
    /// # Errors
    ///
    /// * `NotFound` if payment or charge is missing in the caller's tenant
    /// * `Validation` for a non-positive amount
    /// * `PreconditionFailed` for a bounced/ignored payment or cancelled charge
    /// * `InsufficientPaymentBalance` / `ExceedsOutstandingCharge`
    /// * `Conflict` if either row changed concurrently
    #[instrument(
        skip(self, ctx),
        fields(
            tenant = %ctx.tenant_id,
            payment = %payment_id,
            charge = %charge_id,
            amount = %amount
        )
    )]
    pub async fn allocate(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
        charge_id: ChargeId,
        amount: Money,
    ) -> ReceivablesResult<Allocation> {
        let mut payment = self.store.get_payment(ctx.tenant_id, payment_id).await?;
        let mut charge = self.store.get_charge(ctx.tenant_id, charge_id).await?;

        let allocation = allocate_in_place(
            &mut payment,
            &mut charge,
            self.request(ctx, amount, AllocationSource::Manual),
        )?;

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment);
        changes.update_charge(charge);
        changes.insert_allocation(allocation.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(allocation = %allocation.id, "allocation created");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::AllocationCreated, "Allocation", allocation.id)
                .with_after(&allocation),
        );
        Ok(allocation)
    }

    /// Reverses an allocation, restoring charge and payment
    ///
    /// # Errors
    ///
    /// * `NotFound` if the allocation does not exist (e.g. already reversed)
    /// * `ComputationInvariantViolation` if coverage would go negative
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, allocation = %allocation_id))]
    pub async fn reverse(
        &self,
        ctx: &RequestContext,
        allocation_id: AllocationId,
    ) -> ReceivablesResult<()> {
        let allocation = self.store.get_allocation(ctx.tenant_id, allocation_id).await?;
        let mut payment = self.store.get_payment(ctx.tenant_id, allocation.payment_id).await?;
        let mut charge = self.store.get_charge(ctx.tenant_id, allocation.charge_id).await?;
        let mut credit = match allocation.source {
            AllocationSource::CreditBalance { credit_id } => {
                Some(self.store.get_credit_balance(ctx.tenant_id, credit_id).await?)
            }
            _ => None,
        };

        reverse_in_place(&allocation, &mut payment, &mut charge, credit.as_mut())?;

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment);
        changes.update_charge(charge);
        if let Some(credit) = credit {
            changes.update_credit(credit);
        }
        changes.delete_allocation(allocation.id);
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(amount = %allocation.amount, "allocation reversed");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::AllocationReversed, "Allocation", allocation.id)
                .with_before(&allocation),
        );
        Ok(())
    }

    /// Distributes a whole payment over several charges in one commit
    ///
    /// # Errors
    ///
    /// * `Validation` for an empty part list
    /// * `SplitMismatch` unless the parts sum exactly to the payment amount
    /// * any error of [`AllocationService::allocate`] for an individual part;
    ///   nothing is written in that case
    #[instrument(
        skip(self, ctx, parts),
        fields(tenant = %ctx.tenant_id, payment = %payment_id, parts = parts.len())
    )]
    pub async fn split(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
        parts: Vec<SplitPart>,
    ) -> ReceivablesResult<Vec<Allocation>> {
        if parts.is_empty() {
            return Err(ReceivablesError::validation("a split needs at least one part"));
        }
        let mut payment = self.store.get_payment(ctx.tenant_id, payment_id).await?;

        let amounts: Vec<Money> = parts.iter().map(|p| p.amount).collect();
        let actual = Money::sum(&amounts, payment.currency())?;
        if actual != payment.amount {
            return Err(ReceivablesError::SplitMismatch {
                expected: payment.amount,
                actual,
                difference: actual.checked_sub(&payment.amount)?,
            });
        }

        let mut charges: HashMap<ChargeId, Charge> = HashMap::new();
        let mut allocations = Vec::with_capacity(parts.len());
        for part in &parts {
            if !charges.contains_key(&part.charge_id) {
                let charge = self.store.get_charge(ctx.tenant_id, part.charge_id).await?;
                charges.insert(part.charge_id, charge);
            }
            let charge = charges
                .get_mut(&part.charge_id)
                .ok_or_else(|| ReceivablesError::not_found("Charge", part.charge_id))?;
            let allocation = allocate_in_place(
                &mut payment,
                charge,
                self.request(ctx, part.amount, AllocationSource::Split),
            )?;
            allocations.push(allocation);
        }
        payment.mark_split();

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment.clone());
        for (_, charge) in charges {
            changes.update_charge(charge);
        }
        for allocation in &allocations {
            changes.insert_allocation(allocation.clone());
        }
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(allocations = allocations.len(), "payment split");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::PaymentSplit, "Payment", payment.id)
                .with_after(&allocations),
        );
        Ok(allocations)
    }

    /// Settles a charge from a credit balance of the same contract
    ///
    /// Without an explicit amount, applies as much as both the credit and
    /// the charge allow.
    ///
    /// # Errors
    ///
    /// * `PreconditionFailed` for a consumed credit, a charge of another
    ///   contract or a charge with nothing outstanding
    /// * `Validation` / `ExceedsOutstandingCharge` for explicit amounts that
    ///   do not fit
    #[instrument(
        skip(self, ctx),
        fields(tenant = %ctx.tenant_id, credit = %credit_id, charge = %charge_id)
    )]
    pub async fn apply_credit_balance(
        &self,
        ctx: &RequestContext,
        credit_id: CreditBalanceId,
        charge_id: ChargeId,
        amount: Option<Money>,
    ) -> ReceivablesResult<Allocation> {
        let mut credit = self.store.get_credit_balance(ctx.tenant_id, credit_id).await?;
        if credit.consumed {
            return Err(ReceivablesError::precondition(format!(
                "credit balance {} is already consumed",
                credit.id
            )));
        }
        let mut charge = self.store.get_charge(ctx.tenant_id, charge_id).await?;
        let mut payment = self.store.get_payment(ctx.tenant_id, credit.payment_id).await?;

        let amount = match amount {
            Some(amount) => amount,
            None => {
                let outstanding = charge.outstanding();
                if !outstanding.is_positive() {
                    return Err(ReceivablesError::precondition(format!(
                        "charge {} has nothing outstanding",
                        charge.id
                    )));
                }
                credit.remaining.checked_min(&outstanding)?
            }
        };

        let allocation = apply_credit_in_place(
            &mut credit,
            &mut payment,
            &mut charge,
            self.request(ctx, amount, AllocationSource::CreditBalance { credit_id }),
        )?;

        let mut changes = LedgerChangeSet::new();
        changes.update_credit(credit.clone());
        changes.update_payment(payment);
        changes.update_charge(charge);
        changes.insert_allocation(allocation.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(
            allocation = %allocation.id,
            amount = %allocation.amount,
            remaining = %credit.remaining,
            "credit balance applied"
        );
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::CreditBalanceApplied, "CreditBalance", credit.id)
                .with_after(&allocation),
        );
        Ok(allocation)
    }

    /// Stores a new charge
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a charge of another tenant or one that
    /// already carries coverage
    #[instrument(skip(self, ctx, charge), fields(tenant = %ctx.tenant_id, charge = %charge.id))]
    pub async fn create_charge(
        &self,
        ctx: &RequestContext,
        charge: Charge,
    ) -> ReceivablesResult<Charge> {
        if charge.tenant_id != ctx.tenant_id {
            return Err(ReceivablesError::validation(format!(
                "charge {} belongs to another tenant",
                charge.id
            )));
        }
        if !charge.covered_total.is_zero() {
            return Err(ReceivablesError::validation(format!(
                "new charge {} must not carry coverage",
                charge.id
            )));
        }

        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(charge.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(total = %charge.total, "charge created");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::ChargeCreated, "Charge", charge.id)
                .with_after(&charge),
        );
        Ok(charge)
    }

    /// Cancels a charge; coverage stays as it is
    ///
    /// Cancelling a cancelled charge changes nothing.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, charge = %charge_id))]
    pub async fn cancel_charge(
        &self,
        ctx: &RequestContext,
        charge_id: ChargeId,
    ) -> ReceivablesResult<Charge> {
        let mut charge = self.store.get_charge(ctx.tenant_id, charge_id).await?;
        let before = charge.clone();
        if !charge.cancel() {
            return Ok(charge);
        }

        let mut changes = LedgerChangeSet::new();
        changes.update_charge(charge.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!("charge cancelled");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::ChargeCancelled, "Charge", charge.id)
                .with_before(&before)
                .with_after(&charge),
        );
        Ok(self.store.get_charge(ctx.tenant_id, charge_id).await?)
    }

    fn request<'a>(
        &'a self,
        ctx: &RequestContext,
        amount: Money,
        source: AllocationSource,
    ) -> AllocationRequest<'a> {
        AllocationRequest {
            amount,
            priority: &self.priority,
            source,
            actor: ctx.actor_id,
            at: Utc::now(),
        }
    }
}
