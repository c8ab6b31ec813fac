//! Operator commands
//!
//! [`Operations`] wires the engine services to whatever ports it is given,
//! so the same commands run against PostgreSQL from the binary and against
//! the in-memory adapters in tests. Every command returns a serialisable
//! report; the binary prints it as JSON.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use core_kernel::{ContractId, DunningNoticeId, HealthCheckResult, OperationMetadata, TenantId};
use domain_receivables::{
    AuditSink, AutoMatchService, AutoMatchSummary, DunningService, EscalationSuggestion,
    LedgerStore, ReceivablesConfig, RequestContext, TenancyDirectory,
};

use crate::error::OpsError;

/// Result of `migrate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Versions of every migration known to this build
    pub versions: Vec<i64>,
}

/// Result of `suggest-escalations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationReport {
    pub tenant: TenantId,
    pub as_of: NaiveDate,
    pub suggestions: Vec<EscalationSuggestion>,
}

/// One notice marked as paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedNotice {
    pub notice_id: DunningNoticeId,
    pub contract_id: ContractId,
}

/// Result of `close-settled-notices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    pub tenant: TenantId,
    pub closed: Vec<ClosedNotice>,
}

/// Result of `health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub adapters: Vec<HealthCheckResult>,
}

/// Engine services bound to one set of ports
pub struct Operations {
    auto_match: AutoMatchService,
    dunning: DunningService,
}

impl Operations {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn TenancyDirectory>,
        audit: Arc<dyn AuditSink>,
        config: &ReceivablesConfig,
    ) -> Self {
        Self {
            auto_match: AutoMatchService::new(
                store.clone(),
                directory.clone(),
                audit.clone(),
                config,
            ),
            dunning: DunningService::new(store, directory, audit, config),
        }
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn auto_match(&self, tenant: TenantId) -> Result<AutoMatchSummary, OpsError> {
        let ctx = operator_context(tenant);
        let summary = self.auto_match.auto_match_all(&ctx).await?;
        info!(
            processed = summary.processed,
            matched = summary.matched,
            failed = summary.failed,
            "Auto-match run finished"
        );
        Ok(summary)
    }

    #[instrument(skip(self), fields(tenant = %tenant, as_of = %as_of))]
    pub async fn suggest_escalations(
        &self,
        tenant: TenantId,
        as_of: NaiveDate,
    ) -> Result<EscalationReport, OpsError> {
        let ctx = operator_context(tenant);
        let suggestions = self.dunning.suggest_escalations(&ctx, as_of).await?;
        info!(count = suggestions.len(), "Escalation suggestions computed");
        Ok(EscalationReport {
            tenant,
            as_of,
            suggestions,
        })
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn close_settled_notices(&self, tenant: TenantId) -> Result<CloseReport, OpsError> {
        let ctx = operator_context(tenant);
        let closed = self.dunning.close_settled_notices(&ctx).await?;
        info!(count = closed.len(), "Settled notices closed");
        Ok(CloseReport {
            tenant,
            closed: closed
                .into_iter()
                .map(|n| ClosedNotice {
                    notice_id: n.id,
                    contract_id: n.contract_id,
                })
                .collect(),
        })
    }
}

/// Request context for operator runs
pub fn operator_context(tenant: TenantId) -> RequestContext {
    RequestContext::new(tenant).with_metadata(OperationMetadata::from_source("receivables-ops"))
}

/// Folds adapter health results into one report
pub fn health_report(adapters: Vec<HealthCheckResult>) -> HealthReport {
    let healthy = adapters.iter().all(HealthCheckResult::is_healthy);
    HealthReport { healthy, adapters }
}
