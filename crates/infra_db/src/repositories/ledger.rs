//! Ledger repository
//!
//! SQL for charges, payments, allocations, credit balances and dunning
//! notices. Reads are always filtered by tenant. Writes go through
//! [`LedgerRepository::apply_change_set`], which runs a whole change set in
//! one transaction and guards every update with the version it was read at.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use domain_receivables::{
    Allocation, Charge, ChargeQuery, CreditBalance, DunningNotice, LedgerChangeSet, NoticeStatus,
    Payment, PaymentStatus,
};

use crate::error::DatabaseError;
use crate::rows::{
    enum_to_text, version_to_db, AllocationComponentRow, AllocationRow, ChargeComponentRow,
    ChargeRow, CreditBalanceRow, DunningNoticeRow, PaymentRow,
};

const CHARGE_COLUMNS: &str = "id, tenant_id, contract_id, charge_type, title, currency, total, \
     covered_total, due_date, status, origin, version, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, tenant_id, booking_date, currency, amount, memo, \
     account_identifier, status, allocated_total, credited_total, last_allocated_at, version, \
     created_at, updated_at";

const ALLOCATION_COLUMNS: &str =
    "id, tenant_id, payment_id, charge_id, currency, amount, source, created_by, created_at";

const CREDIT_COLUMNS: &str = "id, tenant_id, contract_id, payment_id, currency, amount, remaining, \
     consumed, version, created_at, updated_at";

const NOTICE_COLUMNS: &str = "id, tenant_id, contract_id, stage, notice_date, currency, \
     outstanding, late_fee, interest, fee_charge_id, interest_charge_id, status, version, \
     created_at, updated_at";

/// Repository for receivables ledger rows
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    /// Creates a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Charges
    // ------------------------------------------------------------------

    /// Fetches one charge with its component lines
    ///
    /// # Arguments
    ///
    /// * `tenant` - Owning tenant; rows of other tenants are invisible
    /// * `id` - Charge identifier
    ///
    /// # Returns
    ///
    /// `None` if no charge with this id exists for the tenant
    pub async fn find_charge(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<Charge>, DatabaseError> {
        let row = sqlx::query_as::<_, ChargeRow>(&format!(
            "SELECT {} FROM charges WHERE id = $1 AND tenant_id = $2",
            CHARGE_COLUMNS
        ))
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut components = self.charge_components(&[row.id]).await?;
                let lines = components.remove(&row.id).unwrap_or_default();
                Ok(Some(row.into_charge(lines)?))
            }
            None => Ok(None),
        }
    }

    /// Charges matching the query, ordered by due date
    pub async fn find_charges(
        &self,
        tenant: Uuid,
        query: &ChargeQuery,
    ) -> Result<Vec<Charge>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM charges WHERE tenant_id = ",
            CHARGE_COLUMNS
        ));
        builder.push_bind(tenant);

        if let Some(ref contract_ids) = query.contract_ids {
            let ids: Vec<Uuid> = contract_ids.iter().map(|id| *id.as_uuid()).collect();
            builder.push(" AND contract_id = ANY(").push_bind(ids).push(")");
        }
        if !query.statuses.is_empty() {
            let statuses = query
                .statuses
                .iter()
                .map(enum_to_text)
                .collect::<Result<Vec<_>, _>>()?;
            builder.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        if let Some(from) = query.due_from {
            builder.push(" AND due_date >= ").push_bind(from);
        }
        if let Some(to) = query.due_to {
            builder.push(" AND due_date <= ").push_bind(to);
        }
        builder.push(" ORDER BY due_date, id");

        let rows: Vec<ChargeRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut components = self.charge_components(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = components.remove(&row.id).unwrap_or_default();
                row.into_charge(lines)
            })
            .collect()
    }

    async fn charge_components(
        &self,
        charge_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ChargeComponentRow>>, DatabaseError> {
        if charge_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, ChargeComponentRow>(
            r#"
            SELECT charge_id, component, amount, covered
            FROM charge_components
            WHERE charge_id = ANY($1)
            ORDER BY charge_id, component
            "#,
        )
        .bind(charge_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<ChargeComponentRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.charge_id).or_default().push(row);
        }
        Ok(grouped)
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub async fn find_payment(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1 AND tenant_id = $2",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    /// Payments in one status, ordered by booking date
    pub async fn find_payments_by_status(
        &self,
        tenant: Uuid,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE tenant_id = $1 AND status = $2 \
             ORDER BY booking_date, id",
            PAYMENT_COLUMNS
        ))
        .bind(tenant)
        .bind(enum_to_text(&status)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    // ------------------------------------------------------------------
    // Allocations
    // ------------------------------------------------------------------

    pub async fn find_allocation(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<Allocation>, DatabaseError> {
        let row = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM allocations WHERE id = $1 AND tenant_id = $2",
            ALLOCATION_COLUMNS
        ))
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut shares = self.allocation_components(&[row.id]).await?;
                let lines = shares.remove(&row.id).unwrap_or_default();
                Ok(Some(row.into_allocation(lines)?))
            }
            None => Ok(None),
        }
    }

    /// Live allocations of a payment, oldest first
    pub async fn find_allocations_for_payment(
        &self,
        tenant: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<Allocation>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM allocations WHERE tenant_id = $1 AND payment_id = $2 \
             ORDER BY created_at, id",
            ALLOCATION_COLUMNS
        ))
        .bind(tenant)
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut shares = self.allocation_components(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let lines = shares.remove(&row.id).unwrap_or_default();
                row.into_allocation(lines)
            })
            .collect()
    }

    async fn allocation_components(
        &self,
        allocation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<AllocationComponentRow>>, DatabaseError> {
        if allocation_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, AllocationComponentRow>(
            r#"
            SELECT allocation_id, component, amount
            FROM allocation_components
            WHERE allocation_id = ANY($1)
            ORDER BY allocation_id, component
            "#,
        )
        .bind(allocation_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<AllocationComponentRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.allocation_id).or_default().push(row);
        }
        Ok(grouped)
    }

    // ------------------------------------------------------------------
    // Credit balances
    // ------------------------------------------------------------------

    pub async fn find_credit_balance(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<CreditBalance>, DatabaseError> {
        let row = sqlx::query_as::<_, CreditBalanceRow>(&format!(
            "SELECT {} FROM credit_balances WHERE id = $1 AND tenant_id = $2",
            CREDIT_COLUMNS
        ))
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CreditBalance::try_from).transpose()
    }

    pub async fn find_credit_balances_for_contract(
        &self,
        tenant: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<CreditBalance>, DatabaseError> {
        let rows = sqlx::query_as::<_, CreditBalanceRow>(&format!(
            "SELECT {} FROM credit_balances WHERE tenant_id = $1 AND contract_id = $2 \
             ORDER BY created_at, id",
            CREDIT_COLUMNS
        ))
        .bind(tenant)
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CreditBalance::try_from).collect()
    }

    // ------------------------------------------------------------------
    // Dunning notices
    // ------------------------------------------------------------------

    pub async fn find_notice(
        &self,
        tenant: Uuid,
        id: Uuid,
    ) -> Result<Option<DunningNotice>, DatabaseError> {
        let row = sqlx::query_as::<_, DunningNoticeRow>(&format!(
            "SELECT {} FROM dunning_notices WHERE id = $1 AND tenant_id = $2",
            NOTICE_COLUMNS
        ))
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DunningNotice::try_from).transpose()
    }

    pub async fn find_notices_for_contract(
        &self,
        tenant: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<DunningNotice>, DatabaseError> {
        let rows = sqlx::query_as::<_, DunningNoticeRow>(&format!(
            "SELECT {} FROM dunning_notices WHERE tenant_id = $1 AND contract_id = $2 \
             ORDER BY notice_date, created_at, id",
            NOTICE_COLUMNS
        ))
        .bind(tenant)
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DunningNotice::try_from).collect()
    }

    pub async fn find_notices_by_status(
        &self,
        tenant: Uuid,
        statuses: &[NoticeStatus],
    ) -> Result<Vec<DunningNotice>, DatabaseError> {
        let statuses = statuses.iter().map(enum_to_text).collect::<Result<Vec<_>, _>>()?;
        let rows = sqlx::query_as::<_, DunningNoticeRow>(&format!(
            "SELECT {} FROM dunning_notices WHERE tenant_id = $1 AND status = ANY($2) \
             ORDER BY notice_date, id",
            NOTICE_COLUMNS
        ))
        .bind(tenant)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DunningNotice::try_from).collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Applies a change set in one transaction
    ///
    /// Rows are written parents first (charges and payments before the
    /// allocations, credits and notices that reference them). Any stale
    /// version, duplicate id or missing allocation rolls the transaction
    /// back.
    ///
    /// # Errors
    ///
    /// * `DatabaseError::StaleVersion` if an update or delete matched no row
    /// * `DatabaseError::DuplicateEntry` if an inserted id already exists
    pub async fn apply_change_set(
        &self,
        tenant: Uuid,
        changes: &LedgerChangeSet,
    ) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        for charge in changes.inserted_charges() {
            insert_charge(&mut *tx, charge).await?;
        }
        for charge in changes.updated_charges() {
            update_charge(&mut *tx, charge).await?;
        }
        for payment in changes.inserted_payments() {
            insert_payment(&mut *tx, payment).await?;
        }
        for payment in changes.updated_payments() {
            update_payment(&mut *tx, payment).await?;
        }
        for id in changes.deleted_allocations() {
            delete_allocation(&mut *tx, tenant, *id.as_uuid()).await?;
        }
        for allocation in changes.inserted_allocations() {
            insert_allocation(&mut *tx, allocation).await?;
        }
        for credit in changes.inserted_credits() {
            insert_credit(&mut *tx, credit).await?;
        }
        for credit in changes.updated_credits() {
            update_credit(&mut *tx, credit).await?;
        }
        for notice in changes.inserted_notices() {
            insert_notice(&mut *tx, notice).await?;
        }
        for notice in changes.updated_notices() {
            update_notice(&mut *tx, notice).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        debug!(writes = changes.len(), "Change set committed");
        Ok(())
    }
}

async fn insert_charge(conn: &mut PgConnection, charge: &Charge) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO charges (
            id, tenant_id, contract_id, charge_type, title, currency, total,
            covered_total, due_date, status, origin, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(charge.id.as_uuid())
    .bind(charge.tenant_id.as_uuid())
    .bind(charge.contract_id.map(|c| *c.as_uuid()))
    .bind(enum_to_text(&charge.charge_type)?)
    .bind(&charge.title)
    .bind(charge.total.currency().code())
    .bind(charge.total.amount())
    .bind(charge.covered_total.amount())
    .bind(charge.due_date)
    .bind(enum_to_text(&charge.status)?)
    .bind(charge.origin.map(sqlx::types::Json))
    .bind(version_to_db(charge.version)?)
    .bind(charge.created_at)
    .bind(charge.updated_at)
    .execute(&mut *conn)
    .await?;

    write_charge_components(conn, charge).await
}

async fn update_charge(conn: &mut PgConnection, charge: &Charge) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE charges
        SET title = $4, total = $5, covered_total = $6, due_date = $7, status = $8,
            origin = $9, updated_at = $10, version = version + 1
        WHERE id = $1 AND tenant_id = $2 AND version = $3
        "#,
    )
    .bind(charge.id.as_uuid())
    .bind(charge.tenant_id.as_uuid())
    .bind(version_to_db(charge.version)?)
    .bind(&charge.title)
    .bind(charge.total.amount())
    .bind(charge.covered_total.amount())
    .bind(charge.due_date)
    .bind(enum_to_text(&charge.status)?)
    .bind(charge.origin.map(sqlx::types::Json))
    .bind(charge.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::stale("Charge", charge.id, charge.version));
    }

    sqlx::query("DELETE FROM charge_components WHERE charge_id = $1")
        .bind(charge.id.as_uuid())
        .execute(&mut *conn)
        .await?;
    write_charge_components(conn, charge).await
}

async fn write_charge_components(
    conn: &mut PgConnection,
    charge: &Charge,
) -> Result<(), DatabaseError> {
    for line in &charge.components {
        sqlx::query(
            r#"
            INSERT INTO charge_components (charge_id, component, amount, covered)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(charge.id.as_uuid())
        .bind(enum_to_text(&line.component)?)
        .bind(line.amount.amount())
        .bind(line.covered.amount())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, tenant_id, booking_date, currency, amount, memo, account_identifier,
            status, allocated_total, credited_total, last_allocated_at, version,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.tenant_id.as_uuid())
    .bind(payment.booking_date)
    .bind(payment.amount.currency().code())
    .bind(payment.amount.amount())
    .bind(&payment.memo)
    .bind(payment.account_identifier.as_deref())
    .bind(enum_to_text(&payment.status)?)
    .bind(payment.allocated_total.amount())
    .bind(payment.credited_total.amount())
    .bind(payment.last_allocated_at)
    .bind(version_to_db(payment.version)?)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_payment(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = $4, allocated_total = $5, credited_total = $6,
            last_allocated_at = $7, updated_at = $8, version = version + 1
        WHERE id = $1 AND tenant_id = $2 AND version = $3
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.tenant_id.as_uuid())
    .bind(version_to_db(payment.version)?)
    .bind(enum_to_text(&payment.status)?)
    .bind(payment.allocated_total.amount())
    .bind(payment.credited_total.amount())
    .bind(payment.last_allocated_at)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::stale("Payment", payment.id, payment.version));
    }
    Ok(())
}

async fn insert_allocation(
    conn: &mut PgConnection,
    allocation: &Allocation,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO allocations (
            id, tenant_id, payment_id, charge_id, currency, amount, source, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(allocation.id.as_uuid())
    .bind(allocation.tenant_id.as_uuid())
    .bind(allocation.payment_id.as_uuid())
    .bind(allocation.charge_id.as_uuid())
    .bind(allocation.amount.currency().code())
    .bind(allocation.amount.amount())
    .bind(sqlx::types::Json(allocation.source))
    .bind(allocation.created_by.map(|a| *a.as_uuid()))
    .bind(allocation.created_at)
    .execute(&mut *conn)
    .await?;

    for share in &allocation.components {
        sqlx::query(
            r#"
            INSERT INTO allocation_components (allocation_id, component, amount)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(allocation.id.as_uuid())
        .bind(enum_to_text(&share.component)?)
        .bind(share.amount.amount())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn delete_allocation(
    conn: &mut PgConnection,
    tenant: Uuid,
    id: Uuid,
) -> Result<(), DatabaseError> {
    // Components go with the row (ON DELETE CASCADE)
    let result = sqlx::query("DELETE FROM allocations WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::StaleVersion(format!(
            "allocation '{}' no longer exists",
            id
        )));
    }
    Ok(())
}

async fn insert_credit(
    conn: &mut PgConnection,
    credit: &CreditBalance,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO credit_balances (
            id, tenant_id, contract_id, payment_id, currency, amount, remaining,
            consumed, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(credit.id.as_uuid())
    .bind(credit.tenant_id.as_uuid())
    .bind(credit.contract_id.as_uuid())
    .bind(credit.payment_id.as_uuid())
    .bind(credit.amount.currency().code())
    .bind(credit.amount.amount())
    .bind(credit.remaining.amount())
    .bind(credit.consumed)
    .bind(version_to_db(credit.version)?)
    .bind(credit.created_at)
    .bind(credit.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_credit(
    conn: &mut PgConnection,
    credit: &CreditBalance,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE credit_balances
        SET remaining = $4, consumed = $5, updated_at = $6, version = version + 1
        WHERE id = $1 AND tenant_id = $2 AND version = $3
        "#,
    )
    .bind(credit.id.as_uuid())
    .bind(credit.tenant_id.as_uuid())
    .bind(version_to_db(credit.version)?)
    .bind(credit.remaining.amount())
    .bind(credit.consumed)
    .bind(credit.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::stale("CreditBalance", credit.id, credit.version));
    }
    Ok(())
}

async fn insert_notice(
    conn: &mut PgConnection,
    notice: &DunningNotice,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO dunning_notices (
            id, tenant_id, contract_id, stage, notice_date, currency, outstanding,
            late_fee, interest, fee_charge_id, interest_charge_id, status, version,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(notice.id.as_uuid())
    .bind(notice.tenant_id.as_uuid())
    .bind(notice.contract_id.as_uuid())
    .bind(enum_to_text(&notice.stage)?)
    .bind(notice.notice_date)
    .bind(notice.outstanding.currency().code())
    .bind(notice.outstanding.amount())
    .bind(notice.late_fee.amount())
    .bind(notice.interest.amount())
    .bind(notice.fee_charge_id.map(|c| *c.as_uuid()))
    .bind(notice.interest_charge_id.map(|c| *c.as_uuid()))
    .bind(enum_to_text(&notice.status)?)
    .bind(version_to_db(notice.version)?)
    .bind(notice.created_at)
    .bind(notice.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_notice(
    conn: &mut PgConnection,
    notice: &DunningNotice,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE dunning_notices
        SET status = $4, fee_charge_id = $5, interest_charge_id = $6,
            updated_at = $7, version = version + 1
        WHERE id = $1 AND tenant_id = $2 AND version = $3
        "#,
    )
    .bind(notice.id.as_uuid())
    .bind(notice.tenant_id.as_uuid())
    .bind(version_to_db(notice.version)?)
    .bind(enum_to_text(&notice.status)?)
    .bind(notice.fee_charge_id.map(|c| *c.as_uuid()))
    .bind(notice.interest_charge_id.map(|c| *c.as_uuid()))
    .bind(notice.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::stale("DunningNotice", notice.id, notice.version));
    }
    Ok(())
}
