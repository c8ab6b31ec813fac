//! Auto-match engine, chargebacks and ignored payments

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{Money, PaymentId};

use crate::allocation::{allocate_in_place, Allocation, AllocationRequest, AllocationSource};
use crate::audit::{emit, AuditAction, AuditEvent, AuditSink};
use crate::charge::{Charge, ChargeOrigin, ChargeType};
use crate::config::ReceivablesConfig;
use crate::context::RequestContext;
use crate::credit::CreditBalance;
use crate::directory::TenancyDirectory;
use crate::error::{ReceivablesError, ReceivablesResult};
use crate::match_rules::{default_rules, MatchContext, MatchRule, MatchRuleKind, RuleMatch};
use crate::payment::{Payment, PaymentStatus};
use crate::store::{ChargeQuery, LedgerChangeSet, LedgerStore};
use crate::waterfall::WaterfallPriority;

/// Result of one auto-match attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatchOutcome {
    pub payment_id: PaymentId,
    pub matched: bool,
    pub rule: Option<MatchRuleKind>,
    pub allocation: Option<Allocation>,
    pub credit_balance: Option<CreditBalance>,
    pub reason: String,
}

impl AutoMatchOutcome {
    fn unmatched(payment_id: PaymentId, reason: impl Into<String>) -> Self {
        Self {
            payment_id,
            matched: false,
            rule: None,
            allocation: None,
            credit_balance: None,
            reason: reason.into(),
        }
    }
}

/// A payment the batch could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatchFailure {
    pub payment_id: PaymentId,
    pub error: String,
}

/// Counts of one auto-match batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatchSummary {
    pub processed: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub failures: Vec<AutoMatchFailure>,
}

/// Result of a chargeback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackOutcome {
    pub payment: Payment,
    pub fee_charge: Option<Charge>,
}

/// Attributes unclear payments to charges
pub struct AutoMatchService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn TenancyDirectory>,
    audit: Arc<dyn AuditSink>,
    rules: Vec<Box<dyn MatchRule>>,
    priority: WaterfallPriority,
    match_window: Duration,
    chargeback_fee: Money,
}

impl AutoMatchService {
    /// Creates the service with the standard rule order
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn TenancyDirectory>,
        audit: Arc<dyn AuditSink>,
        config: &ReceivablesConfig,
    ) -> Self {
        Self {
            store,
            directory,
            audit,
            rules: default_rules(),
            priority: config.waterfall_priority.clone(),
            match_window: Duration::days(config.match_window_days),
            chargeback_fee: config.default_chargeback_fee(),
        }
    }

    /// Replaces the rule list; rules run in the given order
    pub fn with_rules(mut self, rules: Vec<Box<dyn MatchRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Tries to attribute one payment
    ///
    /// Only UNCLEAR payments are considered; for any other status the
    /// outcome is unmatched and names the status.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the payment is missing in the caller's tenant
    /// * `Conflict` if a row changed between read and commit
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, payment = %payment_id))]
    pub async fn auto_match(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
    ) -> ReceivablesResult<AutoMatchOutcome> {
        let payment = self.store.get_payment(ctx.tenant_id, payment_id).await?;
        if payment.status != PaymentStatus::Unclear {
            return Ok(AutoMatchOutcome::unmatched(
                payment.id,
                format!("payment is {}", payment.status),
            ));
        }
        let directory = self.load_directory(ctx).await?;
        self.match_payment(ctx, payment, &directory).await
    }

    /// Runs auto-matching over every unclear payment of the tenant
    ///
    /// Payments are processed oldest first and independently: a failing
    /// payment is recorded in the summary and the batch continues.
    ///
    /// # Errors
    ///
    /// Only fails if the payment list or the directory cannot be loaded
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id))]
    pub async fn auto_match_all(
        &self,
        ctx: &RequestContext,
    ) -> ReceivablesResult<AutoMatchSummary> {
        let payments = self
            .store
            .find_payments_by_status(ctx.tenant_id, PaymentStatus::Unclear)
            .await?;
        let directory = self.load_directory(ctx).await?;

        let mut summary = AutoMatchSummary::default();
        for payment in payments {
            let payment_id = payment.id;
            summary.processed += 1;
            match self.match_payment(ctx, payment, &directory).await {
                Ok(outcome) if outcome.matched => summary.matched += 1,
                Ok(_) => summary.unmatched += 1,
                Err(error) => {
                    warn!(payment = %payment_id, error = %error, "auto-match failed");
                    summary.failed += 1;
                    summary.failures.push(AutoMatchFailure {
                        payment_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            processed = summary.processed,
            matched = summary.matched,
            unmatched = summary.unmatched,
            failed = summary.failed,
            "auto-match batch finished"
        );
        Ok(summary)
    }

    /// Flips a payment to BOUNCED and books a chargeback fee
    ///
    /// The fee (default from configuration) is charged on the contract of
    /// the payment's first allocation, due on `event_date`. No fee is
    /// booked for a zero fee, a payment without allocations, or a first
    /// charge without contract. Existing allocations stay in place.
    ///
    /// # Errors
    ///
    /// * `PreconditionFailed` if the payment already bounced
    /// * `Validation` for a negative fee
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, payment = %payment_id))]
    pub async fn create_chargeback_event(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
        event_date: NaiveDate,
        fee: Option<Money>,
    ) -> ReceivablesResult<ChargebackOutcome> {
        let fee = fee.unwrap_or(self.chargeback_fee);
        if fee.is_negative() {
            return Err(ReceivablesError::validation(format!(
                "chargeback fee must not be negative, got {}",
                fee
            )));
        }

        let mut payment = self.store.get_payment(ctx.tenant_id, payment_id).await?;
        let before = payment.clone();
        payment.mark_bounced()?;

        let allocations = self.store.allocations_for_payment(ctx.tenant_id, payment_id).await?;
        let fee_charge = match allocations.first() {
            Some(first) if fee.is_positive() => {
                let charge = self.store.get_charge(ctx.tenant_id, first.charge_id).await?;
                match charge.contract_id {
                    Some(contract_id) => Some(
                        Charge::new(
                            ctx.tenant_id,
                            Some(contract_id),
                            ChargeType::Other,
                            "Chargeback fee",
                            fee,
                            event_date,
                        )?
                        .with_origin(ChargeOrigin::Chargeback {
                            payment_id,
                            charge_id: charge.id,
                        }),
                    ),
                    None => {
                        info!(
                            charge = %charge.id,
                            "allocated charge has no contract, no chargeback fee"
                        );
                        None
                    }
                }
            }
            Some(_) => {
                info!("zero chargeback fee, none booked");
                None
            }
            None => {
                info!("payment was never allocated, no chargeback fee");
                None
            }
        };

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment.clone());
        if let Some(ref charge) = fee_charge {
            changes.insert_charge(charge.clone());
        }
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(fee_charge = ?fee_charge.as_ref().map(|c| c.id.to_string()), "payment bounced");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::PaymentBounced, "Payment", payment.id)
                .with_before(&before)
                .with_after(&payment),
        );
        if let Some(ref charge) = fee_charge {
            emit(
                self.audit.as_ref(),
                AuditEvent::new(ctx, AuditAction::ChargeCreated, "Charge", charge.id)
                    .with_after(charge),
            );
        }

        Ok(ChargebackOutcome {
            payment: self.store.get_payment(ctx.tenant_id, payment_id).await?,
            fee_charge,
        })
    }

    /// Excludes an unclear payment from reconciliation
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` unless the payment is UNCLEAR
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, payment = %payment_id))]
    pub async fn ignore_payment(
        &self,
        ctx: &RequestContext,
        payment_id: PaymentId,
    ) -> ReceivablesResult<Payment> {
        let mut payment = self.store.get_payment(ctx.tenant_id, payment_id).await?;
        payment.ignore()?;

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!("payment ignored");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::PaymentIgnored, "Payment", payment.id)
                .with_after(&payment),
        );
        Ok(self.store.get_payment(ctx.tenant_id, payment_id).await?)
    }

    /// Directory part of the match context, loaded once per run
    async fn load_directory(&self, ctx: &RequestContext) -> ReceivablesResult<MatchContext> {
        let tenant = ctx.tenant_id;
        Ok(MatchContext {
            candidates: Vec::new(),
            units: self.directory.list_units(tenant).await?,
            renters: self.directory.list_renters(tenant).await?,
            contracts: self.directory.list_contracts(tenant).await?,
            preferences: self.directory.preferences(tenant).await?,
        })
    }

    async fn match_payment(
        &self,
        ctx: &RequestContext,
        payment: Payment,
        directory: &MatchContext,
    ) -> ReceivablesResult<AutoMatchOutcome> {
        if payment.status != PaymentStatus::Unclear {
            return Ok(AutoMatchOutcome::unmatched(
                payment.id,
                format!("payment is {}", payment.status),
            ));
        }

        let query = ChargeQuery::open().due_between(
            payment.booking_date - self.match_window,
            payment.booking_date + self.match_window,
        );
        let mut context = directory.clone();
        context.candidates = self.store.find_charges(ctx.tenant_id, &query).await?;
        debug!(
            payment = %payment.id,
            candidates = context.candidates.len(),
            "evaluating match rules"
        );

        let hit = self.rules.iter().find_map(|rule| {
            let hit = rule.try_match(&payment, &context);
            debug!(
                payment = %payment.id,
                rule = %rule.kind(),
                matched = hit.is_some(),
                "rule evaluated"
            );
            hit
        });

        match hit {
            Some(hit) => self.apply_match(ctx, payment, &context, hit).await,
            None => Ok(AutoMatchOutcome::unmatched(payment.id, "no automatic match")),
        }
    }

    async fn apply_match(
        &self,
        ctx: &RequestContext,
        mut payment: Payment,
        context: &MatchContext,
        hit: RuleMatch,
    ) -> ReceivablesResult<AutoMatchOutcome> {
        let mut charge = context
            .candidates
            .iter()
            .find(|c| c.id == hit.charge_id)
            .cloned()
            .ok_or_else(|| ReceivablesError::invariant(format!(
                "rule {} returned {} which is not a candidate",
                hit.rule, hit.charge_id
            )))?;

        let amount = payment.amount.checked_min(&charge.outstanding())?;
        let allocation = allocate_in_place(
            &mut payment,
            &mut charge,
            AllocationRequest {
                amount,
                priority: &self.priority,
                source: AllocationSource::AutoMatch { rule: hit.rule },
                actor: ctx.actor_id,
                at: Utc::now(),
            },
        )?;

        let excess = payment.unallocated();
        let credit = match charge.contract_id {
            Some(contract_id) if hit.book_excess_as_credit && excess.is_positive() => {
                let credit = CreditBalance::new(ctx.tenant_id, contract_id, payment.id, excess)?;
                payment.record_credit(excess)?;
                Some(credit)
            }
            _ => None,
        };

        let mut changes = LedgerChangeSet::new();
        changes.update_payment(payment.clone());
        changes.update_charge(charge.clone());
        changes.insert_allocation(allocation.clone());
        if let Some(ref credit) = credit {
            changes.insert_credit(credit.clone());
        }
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(
            payment = %payment.id,
            charge = %charge.id,
            rule = %hit.rule,
            amount = %allocation.amount,
            credit = ?credit.as_ref().map(|c| c.amount.to_string()),
            "payment auto-matched"
        );
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::PaymentAutoMatched, "Payment", payment.id)
                .with_after(&allocation),
        );
        if let Some(ref credit) = credit {
            emit(
                self.audit.as_ref(),
                AuditEvent::new(
                    ctx,
                    AuditAction::CreditBalanceCreated,
                    "CreditBalance",
                    credit.id,
                )
                .with_after(credit),
            );
        }

        Ok(AutoMatchOutcome {
            payment_id: payment.id,
            matched: true,
            rule: Some(hit.rule),
            allocation: Some(allocation),
            credit_balance: credit,
            reason: format!("matched by {} rule", hit.rule),
        })
    }
}
