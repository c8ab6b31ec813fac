//! Tenancy directory port
//!
//! Units, renters and contracts are owned by the surrounding
//! property-management system. The receivables engine only reads them, to
//! attribute payments and to find the contracts dunning applies to.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{ContractId, DomainPort, PortError, RenterId, TenantId, UnitId};

/// A rentable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub tenant_id: TenantId,
    /// Human-facing number as printed on the door, e.g. "EG-Links"
    pub unit_number: String,
}

/// A renter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renter {
    pub id: RenterId,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    /// Bank account identifiers (IBANs) the renter pays from
    pub bank_accounts: Vec<String>,
}

impl Renter {
    /// True if `identifier` is one of the renter's accounts, ignoring
    /// whitespace and case
    pub fn owns_account(&self, identifier: &str) -> bool {
        let wanted = normalize_account_identifier(identifier);
        !wanted.is_empty()
            && self
                .bank_accounts
                .iter()
                .any(|a| normalize_account_identifier(a) == wanted)
    }
}

/// A rental contract between a renter and a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub tenant_id: TenantId,
    pub unit_id: UnitId,
    pub renter_id: RenterId,
    pub move_in_date: NaiveDate,
    pub move_out_date: Option<NaiveDate>,
}

impl Contract {
    /// Active until a move-out date is recorded
    pub fn is_active(&self) -> bool {
        self.move_out_date.is_none()
    }
}

/// Tie-break when several charges of a contract match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationOrder {
    #[default]
    OldestDueFirst,
    NewestDueFirst,
}

/// Per-tenant settings relevant to receivables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantPreferences {
    pub allocation_order: AllocationOrder,
}

/// Read access to the tenancy directory
///
/// Every method is scoped to one tenant; records of other tenants are
/// never returned.
#[async_trait]
pub trait TenancyDirectory: DomainPort {
    /// Returns the contract, or `PortError::NotFound`
    async fn get_contract(&self, tenant: TenantId, id: ContractId) -> Result<Contract, PortError>;

    async fn list_units(&self, tenant: TenantId) -> Result<Vec<Unit>, PortError>;

    async fn list_renters(&self, tenant: TenantId) -> Result<Vec<Renter>, PortError>;

    /// All contracts, active or not
    async fn list_contracts(&self, tenant: TenantId) -> Result<Vec<Contract>, PortError>;

    /// Tenant settings; defaults when the tenant has none stored
    async fn preferences(&self, tenant: TenantId) -> Result<TenantPreferences, PortError>;
}

/// Strips whitespace and upper-cases an account identifier
pub fn normalize_account_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
