//! Tenancy directory repository
//!
//! Units, renters (with their bank accounts), contracts and per-tenant
//! settings. The receivables engine only reads these; the write methods
//! exist for the owning system, seeding and tests.

use sqlx::PgPool;
use uuid::Uuid;

use domain_receivables::{Contract, Renter, TenantPreferences, Unit};

use crate::error::DatabaseError;
use crate::rows::{enum_from_text, enum_to_text, ContractRow, RenterRow, UnitRow};

/// Repository for the tenancy directory tables
#[derive(Debug, Clone)]
pub struct TenancyRepository {
    pool: PgPool,
}

impl TenancyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_contract(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<Contract>, DatabaseError> {
        let row = sqlx::query_as::<_, ContractRow>(
            r#"
            SELECT id, tenant_id, unit_id, renter_id, move_in_date, move_out_date
            FROM contracts
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Contract::from))
    }

    pub async fn list_units(&self, tenant: Uuid) -> Result<Vec<Unit>, DatabaseError> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT id, tenant_id, unit_number
            FROM units
            WHERE tenant_id = $1
            ORDER BY unit_number
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Unit::from).collect())
    }

    /// Renters with their bank accounts
    pub async fn list_renters(&self, tenant: Uuid) -> Result<Vec<Renter>, DatabaseError> {
        let rows = sqlx::query_as::<_, RenterRow>(
            r#"
            SELECT r.id, r.tenant_id, r.first_name, r.last_name, r.company_name,
                   COALESCE(
                       array_agg(b.identifier ORDER BY b.identifier)
                           FILTER (WHERE b.identifier IS NOT NULL),
                       '{}'::text[]
                   ) AS bank_accounts
            FROM renters r
            LEFT JOIN renter_bank_accounts b ON b.renter_id = r.id
            WHERE r.tenant_id = $1
            GROUP BY r.id
            ORDER BY r.last_name, r.first_name, r.id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Renter::from).collect())
    }

    pub async fn list_contracts(&self, tenant: Uuid) -> Result<Vec<Contract>, DatabaseError> {
        let rows = sqlx::query_as::<_, ContractRow>(
            r#"
            SELECT id, tenant_id, unit_id, renter_id, move_in_date, move_out_date
            FROM contracts
            WHERE tenant_id = $1
            ORDER BY move_in_date, id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Contract::from).collect())
    }

    /// Stored settings, or `None` if the tenant has never saved any
    pub async fn find_preferences(
        &self,
        tenant: Uuid,
    ) -> Result<Option<TenantPreferences>, DatabaseError> {
        let order: Option<String> = sqlx::query_scalar(
            "SELECT allocation_order FROM tenant_settings WHERE tenant_id = $1",
        )
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        order
            .map(|text| {
                Ok(TenantPreferences {
                    allocation_order: enum_from_text(&text)?,
                })
            })
            .transpose()
    }

    pub async fn upsert_unit(&self, unit: &Unit) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO units (id, tenant_id, unit_number)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET unit_number = EXCLUDED.unit_number
            "#,
        )
        .bind(unit.id.as_uuid())
        .bind(unit.tenant_id.as_uuid())
        .bind(&unit.unit_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes the renter and replaces its bank accounts
    pub async fn upsert_renter(&self, renter: &Renter) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO renters (id, tenant_id, first_name, last_name, company_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                company_name = EXCLUDED.company_name
            "#,
        )
        .bind(renter.id.as_uuid())
        .bind(renter.tenant_id.as_uuid())
        .bind(&renter.first_name)
        .bind(&renter.last_name)
        .bind(renter.company_name.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM renter_bank_accounts WHERE renter_id = $1")
            .bind(renter.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for account in &renter.bank_accounts {
            sqlx::query(
                r#"
                INSERT INTO renter_bank_accounts (renter_id, identifier)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(renter.id.as_uuid())
            .bind(account)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_contract(&self, contract: &Contract) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO contracts (id, tenant_id, unit_id, renter_id, move_in_date, move_out_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET move_in_date = EXCLUDED.move_in_date,
                move_out_date = EXCLUDED.move_out_date
            "#,
        )
        .bind(contract.id.as_uuid())
        .bind(contract.tenant_id.as_uuid())
        .bind(contract.unit_id.as_uuid())
        .bind(contract.renter_id.as_uuid())
        .bind(contract.move_in_date)
        .bind(contract.move_out_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_preferences(
        &self,
        tenant: Uuid,
        preferences: &TenantPreferences,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_settings (tenant_id, allocation_order)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id) DO UPDATE SET allocation_order = EXCLUDED.allocation_order
            "#,
        )
        .bind(tenant)
        .bind(enum_to_text(&preferences.allocation_order)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
