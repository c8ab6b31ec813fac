//! Dunning engine: notices, escalation suggestions and settlement

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{ContractId, Currency, DunningNoticeId, Money};

use crate::audit::{emit, AuditAction, AuditEvent, AuditSink};
use crate::charge::{Charge, ChargeOrigin, ChargeType, NoticeChargeKind};
use crate::config::ReceivablesConfig;
use crate::context::RequestContext;
use crate::directory::TenancyDirectory;
use crate::documents::NoticeDocumentGenerator;
use crate::dunning::{
    accrued_interest, recommend_stage, DunningNotice, DunningStage, EscalationSuggestion,
    EscalationThresholds, InterestTerms, LateFeeSchedule, NoticeStatus,
};
use crate::error::{ReceivablesError, ReceivablesResult};
use crate::store::{ChargeQuery, LedgerChangeSet, LedgerStore};

/// Escalates unpaid charges through dunning stages
pub struct DunningService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn TenancyDirectory>,
    audit: Arc<dyn AuditSink>,
    documents: Option<Arc<dyn NoticeDocumentGenerator>>,
    currency: Currency,
    late_fees: LateFeeSchedule,
    interest: InterestTerms,
    thresholds: EscalationThresholds,
}

impl DunningService {
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
            documents: None,
            currency: config.currency,
            late_fees: config.late_fees.clone(),
            interest: config.interest.clone(),
            thresholds: config.escalation.clone(),
        }
    }

    /// Sets the generator invoked for every new notice
    pub fn with_documents(mut self, documents: Arc<dyn NoticeDocumentGenerator>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Creates a notice with its late-fee and interest charges
    ///
    /// The outstanding snapshot covers every open charge of the contract.
    /// Fee and interest charges are only created when positive; both are
    /// due on the notice date.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the contract is missing in the caller's tenant
    /// * `PreconditionFailed` if nothing is outstanding, or an active notice
    ///   at the same or a later stage exists
    #[instrument(
        skip(self, ctx),
        fields(tenant = %ctx.tenant_id, contract = %contract_id, stage = %stage)
    )]
    pub async fn create_notice(
        &self,
        ctx: &RequestContext,
        contract_id: ContractId,
        stage: DunningStage,
        notice_date: NaiveDate,
    ) -> ReceivablesResult<DunningNotice> {
        let contract = self.directory.get_contract(ctx.tenant_id, contract_id).await?;

        let notices = self.store.notices_for_contract(ctx.tenant_id, contract.id).await?;
        if let Some(blocking) = notices.iter().find(|n| n.is_active() && n.stage >= stage) {
            return Err(ReceivablesError::precondition(format!(
                "contract {} already has an active {} notice {}",
                contract.id, blocking.stage, blocking.id
            )));
        }

        let charges = self
            .store
            .find_charges(ctx.tenant_id, &ChargeQuery::open().for_contract(contract.id))
            .await?;
        if charges.is_empty() {
            return Err(ReceivablesError::precondition(format!(
                "contract {} has no open charges",
                contract.id
            )));
        }
        let outstanding = total_outstanding(&charges, self.currency)?;
        if !outstanding.is_positive() {
            return Err(ReceivablesError::precondition(format!(
                "contract {} has nothing outstanding",
                contract.id
            )));
        }

        let late_fee = self.late_fees.fee_for(stage, self.currency);
        let interest = accrued_interest(&charges, notice_date, &self.interest, self.currency)?;
        let mut notice = DunningNotice::new(
            ctx.tenant_id,
            contract.id,
            stage,
            notice_date,
            outstanding,
            late_fee,
            interest,
        );

        let mut new_charges = Vec::new();
        if late_fee.is_positive() {
            let charge = self.notice_charge(&notice, NoticeChargeKind::LateFee, late_fee)?;
            notice.fee_charge_id = Some(charge.id);
            new_charges.push(charge);
        }
        if interest.is_positive() {
            let charge = self.notice_charge(&notice, NoticeChargeKind::Interest, interest)?;
            notice.interest_charge_id = Some(charge.id);
            new_charges.push(charge);
        }

        let mut changes = LedgerChangeSet::new();
        for charge in &new_charges {
            changes.insert_charge(charge.clone());
        }
        changes.insert_notice(notice.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(
            notice = %notice.id,
            outstanding = %notice.outstanding,
            late_fee = %notice.late_fee,
            interest = %notice.interest,
            "dunning notice created"
        );
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::NoticeCreated, "DunningNotice", notice.id)
                .with_after(&notice),
        );
        for charge in &new_charges {
            emit(
                self.audit.as_ref(),
                AuditEvent::new(ctx, AuditAction::ChargeCreated, "Charge", charge.id)
                    .with_after(charge),
            );
        }

        if let Some(ref documents) = self.documents {
            if let Err(error) = documents.generate(ctx.tenant_id, &notice).await {
                warn!(notice = %notice.id, error = %error, "notice document generation failed");
            }
        }
        Ok(notice)
    }

    /// Cancels a notice and its fee and interest charges
    ///
    /// Cancelling a cancelled notice changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` for a paid notice
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, notice = %notice_id))]
    pub async fn cancel_notice(
        &self,
        ctx: &RequestContext,
        notice_id: DunningNoticeId,
    ) -> ReceivablesResult<DunningNotice> {
        let mut notice = self.store.get_notice(ctx.tenant_id, notice_id).await?;
        let before = notice.clone();
        if !notice.cancel()? {
            return Ok(notice);
        }

        let mut changes = LedgerChangeSet::new();
        let mut cancelled = Vec::new();
        for charge_id in [notice.fee_charge_id, notice.interest_charge_id].into_iter().flatten() {
            let mut charge = self.store.get_charge(ctx.tenant_id, charge_id).await?;
            if charge.cancel() {
                cancelled.push(charge.id);
                changes.update_charge(charge);
            }
        }
        changes.update_notice(notice.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(cancelled_charges = cancelled.len(), "dunning notice cancelled");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::NoticeCancelled, "DunningNotice", notice.id)
                .with_before(&before)
                .with_after(&notice),
        );
        for charge_id in cancelled {
            emit(
                self.audit.as_ref(),
                AuditEvent::new(ctx, AuditAction::ChargeCancelled, "Charge", charge_id),
            );
        }
        Ok(self.store.get_notice(ctx.tenant_id, notice_id).await?)
    }

    /// Records that an open notice went out
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` unless the notice is OPEN
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, notice = %notice_id))]
    pub async fn mark_sent(
        &self,
        ctx: &RequestContext,
        notice_id: DunningNoticeId,
    ) -> ReceivablesResult<DunningNotice> {
        let mut notice = self.store.get_notice(ctx.tenant_id, notice_id).await?;
        notice.mark_sent()?;

        let mut changes = LedgerChangeSet::new();
        changes.update_notice(notice.clone());
        self.store.commit(ctx.tenant_id, changes).await?;

        info!("dunning notice sent");
        emit(
            self.audit.as_ref(),
            AuditEvent::new(ctx, AuditAction::NoticeSent, "DunningNotice", notice.id),
        );
        Ok(self.store.get_notice(ctx.tenant_id, notice_id).await?)
    }

    /// Proposes the next stage for every active contract with open charges
    ///
    /// Suggestions are ordered by days overdue, longest first.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id, as_of = %as_of))]
    pub async fn suggest_escalations(
        &self,
        ctx: &RequestContext,
        as_of: NaiveDate,
    ) -> ReceivablesResult<Vec<EscalationSuggestion>> {
        let contracts = self.directory.list_contracts(ctx.tenant_id).await?;
        let open_charges = self.store.find_charges(ctx.tenant_id, &ChargeQuery::open()).await?;
        let active_notices = self
            .store
            .find_notices_by_status(ctx.tenant_id, &NoticeStatus::ACTIVE_STATES)
            .await?;

        let mut charges_by_contract: HashMap<ContractId, Vec<Charge>> = HashMap::new();
        for charge in open_charges {
            if let Some(contract_id) = charge.contract_id {
                charges_by_contract.entry(contract_id).or_default().push(charge);
            }
        }

        let mut latest_notice: HashMap<ContractId, &DunningNotice> = HashMap::new();
        for notice in &active_notices {
            let newer = latest_notice.get(&notice.contract_id).map_or(true, |current| {
                (notice.notice_date, notice.created_at) > (current.notice_date, current.created_at)
            });
            if newer {
                latest_notice.insert(notice.contract_id, notice);
            }
        }

        let mut suggestions = Vec::new();
        for contract in contracts.iter().filter(|c| c.is_active()) {
            let Some(charges) = charges_by_contract.get(&contract.id) else {
                continue;
            };
            let Some(earliest_due) = charges.iter().map(|c| c.due_date).min() else {
                continue;
            };
            let days_overdue = (as_of - earliest_due).num_days();
            let current_stage = latest_notice.get(&contract.id).map(|n| n.stage);

            if let Some(recommended_stage) =
                recommend_stage(current_stage, days_overdue, &self.thresholds)
            {
                suggestions.push(EscalationSuggestion {
                    contract_id: contract.id,
                    current_stage,
                    recommended_stage,
                    days_overdue,
                    outstanding: total_outstanding(charges, self.currency)?,
                });
            }
        }
        suggestions.sort_by(|a, b| {
            b.days_overdue
                .cmp(&a.days_overdue)
                .then(a.contract_id.cmp(&b.contract_id))
        });

        info!(suggestions = suggestions.len(), "escalation suggestions computed");
        Ok(suggestions)
    }

    /// Marks every active notice PAID whose contract owes nothing
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id))]
    pub async fn close_settled_notices(
        &self,
        ctx: &RequestContext,
    ) -> ReceivablesResult<Vec<DunningNotice>> {
        let active = self
            .store
            .find_notices_by_status(ctx.tenant_id, &NoticeStatus::ACTIVE_STATES)
            .await?;

        let mut settled: HashMap<ContractId, bool> = HashMap::new();
        let mut changes = LedgerChangeSet::new();
        let mut closed = Vec::new();
        for mut notice in active {
            let is_settled = match settled.get(&notice.contract_id) {
                Some(known) => *known,
                None => {
                    let charges = self
                        .store
                        .find_charges(
                            ctx.tenant_id,
                            &ChargeQuery::open().for_contract(notice.contract_id),
                        )
                        .await?;
                    let known = !total_outstanding(&charges, self.currency)?.is_positive();
                    settled.insert(notice.contract_id, known);
                    known
                }
            };
            if is_settled {
                notice.mark_paid()?;
                closed.push(notice.id);
                changes.update_notice(notice);
            }
        }

        if changes.is_empty() {
            return Ok(Vec::new());
        }
        self.store.commit(ctx.tenant_id, changes).await?;

        info!(closed = closed.len(), "settled dunning notices closed");
        let mut notices = Vec::with_capacity(closed.len());
        for id in closed {
            emit(
                self.audit.as_ref(),
                AuditEvent::new(ctx, AuditAction::NoticePaid, "DunningNotice", id),
            );
            notices.push(self.store.get_notice(ctx.tenant_id, id).await?);
        }
        Ok(notices)
    }

    fn notice_charge(
        &self,
        notice: &DunningNotice,
        kind: NoticeChargeKind,
        amount: Money,
    ) -> ReceivablesResult<Charge> {
        let (charge_type, title) = match kind {
            NoticeChargeKind::LateFee => {
                (ChargeType::LateFee, format!("Late fee {}", notice.stage))
            }
            NoticeChargeKind::Interest => {
                (ChargeType::Interest, format!("Default interest {}", notice.stage))
            }
        };
        Ok(Charge::new(
            notice.tenant_id,
            Some(notice.contract_id),
            charge_type,
            title,
            amount,
            notice.notice_date,
        )?
        .with_origin(ChargeOrigin::DunningNotice {
            notice_id: notice.id,
            kind,
        }))
    }
}

fn total_outstanding(charges: &[Charge], currency: Currency) -> ReceivablesResult<Money> {
    let outstanding: Vec<Money> = charges.iter().map(Charge::outstanding).collect();
    Ok(Money::sum(&outstanding, currency)?)
}
