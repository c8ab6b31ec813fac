//! PostgreSQL Ledger Store
//!
//! Implements [`LedgerStore`] on top of [`LedgerRepository`]. A commit is a
//! single database transaction; versioned `UPDATE ... WHERE version = $n`
//! statements turn a concurrent writer into `PortError::Conflict` instead
//! of a lost update.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use core_kernel::{
    AllocationId, ChargeId, ContractId, CreditBalanceId, DomainPort, DunningNoticeId,
    HealthCheckResult, HealthCheckable, PaymentId, PortError, TenantId,
};
use domain_receivables::{
    Allocation, Charge, ChargeQuery, CreditBalance, DunningNotice, LedgerChangeSet, LedgerStore,
    NoticeStatus, Payment, PaymentStatus,
};

use crate::repositories::LedgerRepository;

/// PostgreSQL-backed implementation of the LedgerStore port
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - missing or foreign-tenant row -> `PortError::NotFound`
/// - stale version, duplicate id, vanished allocation -> `PortError::Conflict`
/// - check constraint violation -> `PortError::Validation`
/// - pool or connection failure -> `PortError::Connection`
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    repository: LedgerRepository,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: LedgerRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &LedgerRepository {
        &self.repository
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(self.repository.pool(), "postgres-ledger-store").await
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(tenant = %tenant, charge_id = %id))]
    async fn get_charge(&self, tenant: TenantId, id: ChargeId) -> Result<Charge, PortError> {
        self.repository
            .find_charge(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Charge", id))
    }

    #[instrument(skip(self, query), fields(tenant = %tenant))]
    async fn find_charges(
        &self,
        tenant: TenantId,
        query: &ChargeQuery,
    ) -> Result<Vec<Charge>, PortError> {
        let charges = self.repository.find_charges(*tenant.as_uuid(), query).await?;
        debug!(count = charges.len(), "Loaded charges");
        Ok(charges)
    }

    #[instrument(skip(self), fields(tenant = %tenant, payment_id = %id))]
    async fn get_payment(&self, tenant: TenantId, id: PaymentId) -> Result<Payment, PortError> {
        self.repository
            .find_payment(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    #[instrument(skip(self), fields(tenant = %tenant, status = %status))]
    async fn find_payments_by_status(
        &self,
        tenant: TenantId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, PortError> {
        Ok(self
            .repository
            .find_payments_by_status(*tenant.as_uuid(), status)
            .await?)
    }

    #[instrument(skip(self), fields(tenant = %tenant, allocation_id = %id))]
    async fn get_allocation(
        &self,
        tenant: TenantId,
        id: AllocationId,
    ) -> Result<Allocation, PortError> {
        self.repository
            .find_allocation(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Allocation", id))
    }

    #[instrument(skip(self), fields(tenant = %tenant, payment_id = %payment_id))]
    async fn allocations_for_payment(
        &self,
        tenant: TenantId,
        payment_id: PaymentId,
    ) -> Result<Vec<Allocation>, PortError> {
        Ok(self
            .repository
            .find_allocations_for_payment(*tenant.as_uuid(), *payment_id.as_uuid())
            .await?)
    }

    #[instrument(skip(self), fields(tenant = %tenant, credit_id = %id))]
    async fn get_credit_balance(
        &self,
        tenant: TenantId,
        id: CreditBalanceId,
    ) -> Result<CreditBalance, PortError> {
        self.repository
            .find_credit_balance(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("CreditBalance", id))
    }

    #[instrument(skip(self), fields(tenant = %tenant, contract_id = %contract_id))]
    async fn credit_balances_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<CreditBalance>, PortError> {
        Ok(self
            .repository
            .find_credit_balances_for_contract(*tenant.as_uuid(), *contract_id.as_uuid())
            .await?)
    }

    #[instrument(skip(self), fields(tenant = %tenant, notice_id = %id))]
    async fn get_notice(
        &self,
        tenant: TenantId,
        id: DunningNoticeId,
    ) -> Result<DunningNotice, PortError> {
        self.repository
            .find_notice(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("DunningNotice", id))
    }

    #[instrument(skip(self), fields(tenant = %tenant, contract_id = %contract_id))]
    async fn notices_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<DunningNotice>, PortError> {
        Ok(self
            .repository
            .find_notices_for_contract(*tenant.as_uuid(), *contract_id.as_uuid())
            .await?)
    }

    #[instrument(skip(self, statuses), fields(tenant = %tenant))]
    async fn find_notices_by_status(
        &self,
        tenant: TenantId,
        statuses: &[NoticeStatus],
    ) -> Result<Vec<DunningNotice>, PortError> {
        Ok(self
            .repository
            .find_notices_by_status(*tenant.as_uuid(), statuses)
            .await?)
    }

    #[instrument(skip(self, changes), fields(tenant = %tenant, writes = changes.len()))]
    async fn commit(&self, tenant: TenantId, changes: LedgerChangeSet) -> Result<(), PortError> {
        changes.ensure_tenant(tenant)?;
        if changes.is_empty() {
            return Ok(());
        }

        self.repository
            .apply_change_set(*tenant.as_uuid(), &changes)
            .await
            .map_err(|e| {
                let error = PortError::from(e);
                if error.is_conflict() {
                    warn!(error = %error, "Change set rejected");
                }
                error
            })
    }
}
