//! Database rows and their mapping to ledger values
//!
//! Enums are stored as the same text their serde representation uses
//! (`PARTIALLY_PAID`, `cold_rent`, `NOTICE_1`), so the database and JSON
//! exports read alike. Tagged enums (`ChargeOrigin`, `AllocationSource`)
//! are stored as JSONB.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{
    ActorId, AllocationId, ChargeId, ContractId, CreditBalanceId, Currency, DunningNoticeId, Money,
    PaymentId, RenterId, TenantId, UnitId,
};
use domain_receivables::{
    Allocation, AllocationSource, Charge, ChargeOrigin, ComponentLine, ComponentShare, Contract,
    CreditBalance, DunningNotice, Payment, Renter, Unit,
};

use crate::error::DatabaseError;

/// Text form of a unit-like enum, as serde writes it
pub(crate) fn enum_to_text<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => Ok(text),
        Ok(other) => Err(DatabaseError::SerializationError(format!(
            "expected a text enum, got {}",
            other
        ))),
        Err(e) => Err(DatabaseError::SerializationError(e.to_string())),
    }
}

pub(crate) fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|e| DatabaseError::SerializationError(format!("'{}': {}", text, e)))
}

pub(crate) fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    code.parse()
        .map_err(|e: core_kernel::MoneyError| DatabaseError::SerializationError(e.to_string()))
}

pub(crate) fn version_to_db(version: u64) -> Result<i64, DatabaseError> {
    i64::try_from(version)
        .map_err(|_| DatabaseError::SerializationError(format!("version {} out of range", version)))
}

fn version_from_db(version: i64) -> Result<u64, DatabaseError> {
    u64::try_from(version)
        .map_err(|_| DatabaseError::SerializationError(format!("negative version {}", version)))
}

/// Database row for a charge
#[derive(Debug, Clone, FromRow)]
pub struct ChargeRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub charge_type: String,
    pub title: String,
    pub currency: String,
    pub total: Decimal,
    pub covered_total: Decimal,
    pub due_date: NaiveDate,
    pub status: String,
    pub origin: Option<Json<ChargeOrigin>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for one component line of a charge
#[derive(Debug, Clone, FromRow)]
pub struct ChargeComponentRow {
    pub charge_id: Uuid,
    pub component: String,
    pub amount: Decimal,
    pub covered: Decimal,
}

impl ChargeRow {
    /// Assembles the charge from its row and its component rows
    pub fn into_charge(self, components: Vec<ChargeComponentRow>) -> Result<Charge, DatabaseError> {
        let currency = parse_currency(&self.currency)?;
        let components = components
            .into_iter()
            .map(|c| {
                Ok(ComponentLine {
                    component: enum_from_text(&c.component)?,
                    amount: Money::new(c.amount, currency),
                    covered: Money::new(c.covered, currency),
                })
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        Ok(Charge {
            id: ChargeId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            contract_id: self.contract_id.map(ContractId::from_uuid),
            charge_type: enum_from_text(&self.charge_type)?,
            title: self.title,
            total: Money::new(self.total, currency),
            components,
            due_date: self.due_date,
            covered_total: Money::new(self.covered_total, currency),
            status: enum_from_text(&self.status)?,
            origin: self.origin.map(|Json(origin)| origin),
            version: version_from_db(self.version)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for a payment
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub booking_date: NaiveDate,
    pub currency: String,
    pub amount: Decimal,
    pub memo: String,
    pub account_identifier: Option<String>,
    pub status: String,
    pub allocated_total: Decimal,
    pub credited_total: Decimal,
    pub last_allocated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            booking_date: row.booking_date,
            amount: Money::new(row.amount, currency),
            memo: row.memo,
            account_identifier: row.account_identifier,
            status: enum_from_text(&row.status)?,
            allocated_total: Money::new(row.allocated_total, currency),
            credited_total: Money::new(row.credited_total, currency),
            last_allocated_at: row.last_allocated_at,
            version: version_from_db(row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for an allocation
#[derive(Debug, Clone, FromRow)]
pub struct AllocationRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payment_id: Uuid,
    pub charge_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
    pub source: Json<AllocationSource>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AllocationComponentRow {
    pub allocation_id: Uuid,
    pub component: String,
    pub amount: Decimal,
}

impl AllocationRow {
    pub fn into_allocation(
        self,
        components: Vec<AllocationComponentRow>,
    ) -> Result<Allocation, DatabaseError> {
        let currency = parse_currency(&self.currency)?;
        let components = components
            .into_iter()
            .map(|c| {
                Ok(ComponentShare::new(
                    enum_from_text(&c.component)?,
                    Money::new(c.amount, currency),
                ))
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        Ok(Allocation {
            id: AllocationId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            payment_id: PaymentId::from_uuid(self.payment_id),
            charge_id: ChargeId::from_uuid(self.charge_id),
            amount: Money::new(self.amount, currency),
            components,
            source: self.source.0,
            created_by: self.created_by.map(ActorId::from_uuid),
            created_at: self.created_at,
        })
    }
}

/// Database row for a credit balance
#[derive(Debug, Clone, FromRow)]
pub struct CreditBalanceRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub payment_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
    pub remaining: Decimal,
    pub consumed: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CreditBalanceRow> for CreditBalance {
    type Error = DatabaseError;

    fn try_from(row: CreditBalanceRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(CreditBalance {
            id: CreditBalanceId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            contract_id: ContractId::from_uuid(row.contract_id),
            payment_id: PaymentId::from_uuid(row.payment_id),
            amount: Money::new(row.amount, currency),
            remaining: Money::new(row.remaining, currency),
            consumed: row.consumed,
            version: version_from_db(row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a dunning notice
#[derive(Debug, Clone, FromRow)]
pub struct DunningNoticeRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub stage: String,
    pub notice_date: NaiveDate,
    pub currency: String,
    pub outstanding: Decimal,
    pub late_fee: Decimal,
    pub interest: Decimal,
    pub fee_charge_id: Option<Uuid>,
    pub interest_charge_id: Option<Uuid>,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DunningNoticeRow> for DunningNotice {
    type Error = DatabaseError;

    fn try_from(row: DunningNoticeRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(DunningNotice {
            id: DunningNoticeId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            contract_id: ContractId::from_uuid(row.contract_id),
            stage: enum_from_text(&row.stage)?,
            notice_date: row.notice_date,
            outstanding: Money::new(row.outstanding, currency),
            late_fee: Money::new(row.late_fee, currency),
            interest: Money::new(row.interest, currency),
            fee_charge_id: row.fee_charge_id.map(ChargeId::from_uuid),
            interest_charge_id: row.interest_charge_id.map(ChargeId::from_uuid),
            status: enum_from_text(&row.status)?,
            version: version_from_db(row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UnitRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub unit_number: String,
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Unit {
            id: UnitId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            unit_number: row.unit_number,
        }
    }
}

/// Renter row with its bank accounts aggregated into an array
#[derive(Debug, Clone, FromRow)]
pub struct RenterRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub bank_accounts: Vec<String>,
}

impl From<RenterRow> for Renter {
    fn from(row: RenterRow) -> Self {
        Renter {
            id: RenterId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            first_name: row.first_name,
            last_name: row.last_name,
            company_name: row.company_name,
            bank_accounts: row.bank_accounts,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ContractRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub unit_id: Uuid,
    pub renter_id: Uuid,
    pub move_in_date: NaiveDate,
    pub move_out_date: Option<NaiveDate>,
}

impl From<ContractRow> for Contract {
    fn from(row: ContractRow) -> Self {
        Contract {
            id: ContractId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            unit_id: UnitId::from_uuid(row.unit_id),
            renter_id: RenterId::from_uuid(row.renter_id),
            move_in_date: row.move_in_date,
            move_out_date: row.move_out_date,
        }
    }
}
