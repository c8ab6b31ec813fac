//! PostgreSQL Tenancy Directory
//!
//! Read side of the tenancy tables for the receivables engine, plus the
//! upserts the owning system uses to keep them current.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    ContractId, DomainPort, HealthCheckResult, HealthCheckable, PortError, TenantId,
};
use domain_receivables::{Contract, Renter, TenancyDirectory, TenantPreferences, Unit};

use crate::error::DatabaseError;
use crate::repositories::TenancyRepository;

/// PostgreSQL-backed implementation of the TenancyDirectory port
#[derive(Debug, Clone)]
pub struct PostgresTenancyDirectory {
    repository: TenancyRepository,
    pool: PgPool,
}

impl PostgresTenancyDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: TenancyRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn save_unit(&self, unit: &Unit) -> Result<(), DatabaseError> {
        self.repository.upsert_unit(unit).await
    }

    pub async fn save_renter(&self, renter: &Renter) -> Result<(), DatabaseError> {
        self.repository.upsert_renter(renter).await
    }

    pub async fn save_contract(&self, contract: &Contract) -> Result<(), DatabaseError> {
        self.repository.upsert_contract(contract).await
    }

    pub async fn save_preferences(
        &self,
        tenant: TenantId,
        preferences: &TenantPreferences,
    ) -> Result<(), DatabaseError> {
        self.repository.save_preferences(*tenant.as_uuid(), preferences).await
    }
}

impl DomainPort for PostgresTenancyDirectory {}

#[async_trait]
impl HealthCheckable for PostgresTenancyDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(&self.pool, "postgres-tenancy-directory").await
    }
}

#[async_trait]
impl TenancyDirectory for PostgresTenancyDirectory {
    #[instrument(skip(self), fields(tenant = %tenant, contract_id = %id))]
    async fn get_contract(&self, tenant: TenantId, id: ContractId) -> Result<Contract, PortError> {
        self.repository
            .find_contract(*tenant.as_uuid(), *id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Contract", id))
    }

    async fn list_units(&self, tenant: TenantId) -> Result<Vec<Unit>, PortError> {
        Ok(self.repository.list_units(*tenant.as_uuid()).await?)
    }

    async fn list_renters(&self, tenant: TenantId) -> Result<Vec<Renter>, PortError> {
        Ok(self.repository.list_renters(*tenant.as_uuid()).await?)
    }

    async fn list_contracts(&self, tenant: TenantId) -> Result<Vec<Contract>, PortError> {
        Ok(self.repository.list_contracts(*tenant.as_uuid()).await?)
    }

    async fn preferences(&self, tenant: TenantId) -> Result<TenantPreferences, PortError> {
        Ok(self
            .repository
            .find_preferences(*tenant.as_uuid())
            .await?
            .unwrap_or_default())
    }
}
