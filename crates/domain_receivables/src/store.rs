//! Ledger store port
//!
//! The engine reads ledger rows through [`LedgerStore`] and writes them
//! back as one [`LedgerChangeSet`] per operation. A change set is applied
//! all-or-nothing: every updated row carries the `version` it was read at,
//! and a row that changed in the meantime aborts the whole commit with
//! `PortError::Conflict`. Stored versions are bumped by one per update;
//! inserted rows start at the version they carry.
//!
//! # Adapters
//!
//! - [`MemoryLedgerStore`](crate::memory::MemoryLedgerStore) for tests and
//!   embedded use
//! - `PostgresLedgerStore` in `infra_db`

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{
    AllocationId, ChargeId, ContractId, CreditBalanceId, DomainPort, DunningNoticeId, PaymentId,
    PortError, TenantId,
};

use crate::allocation::Allocation;
use crate::charge::{Charge, ChargeStatus};
use crate::credit::CreditBalance;
use crate::dunning::{DunningNotice, NoticeStatus};
use crate::payment::{Payment, PaymentStatus};

/// Filter for charge lookups
#[derive(Debug, Clone, Default)]
pub struct ChargeQuery {
    /// Restrict to these contracts; `None` means any contract
    pub contract_ids: Option<Vec<ContractId>>,
    /// Restrict to these statuses; empty means any status
    pub statuses: Vec<ChargeStatus>,
    /// Inclusive lower bound on the due date
    pub due_from: Option<NaiveDate>,
    /// Inclusive upper bound on the due date
    pub due_to: Option<NaiveDate>,
}

impl ChargeQuery {
    /// Charges that still expect money
    pub fn open() -> Self {
        Self {
            statuses: ChargeStatus::OPEN_STATES.to_vec(),
            ..Default::default()
        }
    }

    pub fn for_contract(mut self, contract_id: ContractId) -> Self {
        self.contract_ids = Some(vec![contract_id]);
        self
    }

    pub fn for_contracts(mut self, contract_ids: Vec<ContractId>) -> Self {
        self.contract_ids = Some(contract_ids);
        self
    }

    pub fn due_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.due_from = Some(from);
        self.due_to = Some(to);
        self
    }

    /// Evaluates the filter against one charge
    pub fn matches(&self, charge: &Charge) -> bool {
        if let Some(ref ids) = self.contract_ids {
            match charge.contract_id {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&charge.status) {
            return false;
        }
        if let Some(from) = self.due_from {
            if charge.due_date < from {
                return false;
            }
        }
        if let Some(to) = self.due_to {
            if charge.due_date > to {
                return false;
            }
        }
        true
    }
}

/// Writes of one operation, committed atomically
///
/// Recording the same row twice keeps only the latest copy, so a service
/// can touch a row repeatedly while building a split.
#[derive(Debug, Clone, Default)]
pub struct LedgerChangeSet {
    inserted_charges: Vec<Charge>,
    updated_charges: Vec<Charge>,
    inserted_payments: Vec<Payment>,
    updated_payments: Vec<Payment>,
    inserted_allocations: Vec<Allocation>,
    deleted_allocations: Vec<AllocationId>,
    inserted_credits: Vec<CreditBalance>,
    updated_credits: Vec<CreditBalance>,
    inserted_notices: Vec<DunningNotice>,
    updated_notices: Vec<DunningNotice>,
}

macro_rules! upsert_by_id {
    ($list:expr, $row:expr) => {{
        let row = $row;
        match $list.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => $list.push(row),
        }
    }};
}

impl LedgerChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_charge(&mut self, charge: Charge) {
        upsert_by_id!(self.inserted_charges, charge);
    }

    /// Records an update; a charge inserted in this change set is replaced
    /// in place instead
    pub fn update_charge(&mut self, charge: Charge) {
        if let Some(pending) = self.inserted_charges.iter_mut().find(|c| c.id == charge.id) {
            *pending = charge;
        } else {
            upsert_by_id!(self.updated_charges, charge);
        }
    }

    pub fn insert_payment(&mut self, payment: Payment) {
        upsert_by_id!(self.inserted_payments, payment);
    }

    pub fn update_payment(&mut self, payment: Payment) {
        if let Some(pending) = self.inserted_payments.iter_mut().find(|p| p.id == payment.id) {
            *pending = payment;
        } else {
            upsert_by_id!(self.updated_payments, payment);
        }
    }

    pub fn insert_allocation(&mut self, allocation: Allocation) {
        upsert_by_id!(self.inserted_allocations, allocation);
    }

    pub fn delete_allocation(&mut self, id: AllocationId) {
        if !self.deleted_allocations.contains(&id) {
            self.deleted_allocations.push(id);
        }
    }

    pub fn insert_credit(&mut self, credit: CreditBalance) {
        upsert_by_id!(self.inserted_credits, credit);
    }

    pub fn update_credit(&mut self, credit: CreditBalance) {
        if let Some(pending) = self.inserted_credits.iter_mut().find(|c| c.id == credit.id) {
            *pending = credit;
        } else {
            upsert_by_id!(self.updated_credits, credit);
        }
    }

    pub fn insert_notice(&mut self, notice: DunningNotice) {
        upsert_by_id!(self.inserted_notices, notice);
    }

    pub fn update_notice(&mut self, notice: DunningNotice) {
        if let Some(pending) = self.inserted_notices.iter_mut().find(|n| n.id == notice.id) {
            *pending = notice;
        } else {
            upsert_by_id!(self.updated_notices, notice);
        }
    }

    pub fn inserted_charges(&self) -> &[Charge] {
        &self.inserted_charges
    }

    pub fn updated_charges(&self) -> &[Charge] {
        &self.updated_charges
    }

    pub fn inserted_payments(&self) -> &[Payment] {
        &self.inserted_payments
    }

    pub fn updated_payments(&self) -> &[Payment] {
        &self.updated_payments
    }

    pub fn inserted_allocations(&self) -> &[Allocation] {
        &self.inserted_allocations
    }

    pub fn deleted_allocations(&self) -> &[AllocationId] {
        &self.deleted_allocations
    }

    pub fn inserted_credits(&self) -> &[CreditBalance] {
        &self.inserted_credits
    }

    pub fn updated_credits(&self) -> &[CreditBalance] {
        &self.updated_credits
    }

    pub fn inserted_notices(&self) -> &[DunningNotice] {
        &self.inserted_notices
    }

    pub fn updated_notices(&self) -> &[DunningNotice] {
        &self.updated_notices
    }

    /// Number of row writes
    pub fn len(&self) -> usize {
        self.inserted_charges.len()
            + self.updated_charges.len()
            + self.inserted_payments.len()
            + self.updated_payments.len()
            + self.inserted_allocations.len()
            + self.deleted_allocations.len()
            + self.inserted_credits.len()
            + self.updated_credits.len()
            + self.inserted_notices.len()
            + self.updated_notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails with `PortError::Validation` if any row belongs to another
    /// tenant; adapters call this before writing anything
    pub fn ensure_tenant(&self, tenant: TenantId) -> Result<(), PortError> {
        let foreign = self
            .inserted_charges
            .iter()
            .chain(&self.updated_charges)
            .map(|c| c.tenant_id)
            .chain(self.inserted_payments.iter().chain(&self.updated_payments).map(|p| p.tenant_id))
            .chain(self.inserted_allocations.iter().map(|a| a.tenant_id))
            .chain(self.inserted_credits.iter().chain(&self.updated_credits).map(|c| c.tenant_id))
            .chain(self.inserted_notices.iter().chain(&self.updated_notices).map(|n| n.tenant_id))
            .any(|t| t != tenant);
        if foreign {
            return Err(PortError::validation(format!(
                "change set contains rows outside tenant {}",
                tenant
            )));
        }
        Ok(())
    }
}

/// Tenant-scoped access to the receivables ledger
#[async_trait]
pub trait LedgerStore: DomainPort {
    async fn get_charge(&self, tenant: TenantId, id: ChargeId) -> Result<Charge, PortError>;

    /// Charges matching `query`, ordered by due date
    async fn find_charges(
        &self,
        tenant: TenantId,
        query: &ChargeQuery,
    ) -> Result<Vec<Charge>, PortError>;

    async fn get_payment(&self, tenant: TenantId, id: PaymentId) -> Result<Payment, PortError>;

    /// Payments in `status`, ordered by booking date
    async fn find_payments_by_status(
        &self,
        tenant: TenantId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, PortError>;

    async fn get_allocation(
        &self,
        tenant: TenantId,
        id: AllocationId,
    ) -> Result<Allocation, PortError>;

    /// Live allocations of a payment, oldest first
    async fn allocations_for_payment(
        &self,
        tenant: TenantId,
        payment_id: PaymentId,
    ) -> Result<Vec<Allocation>, PortError>;

    async fn get_credit_balance(
        &self,
        tenant: TenantId,
        id: CreditBalanceId,
    ) -> Result<CreditBalance, PortError>;

    async fn credit_balances_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<CreditBalance>, PortError>;

    async fn get_notice(
        &self,
        tenant: TenantId,
        id: DunningNoticeId,
    ) -> Result<DunningNotice, PortError>;

    /// All notices of a contract, by notice date then creation
    async fn notices_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<DunningNotice>, PortError>;

    /// Notices in any of `statuses`, by notice date
    async fn find_notices_by_status(
        &self,
        tenant: TenantId,
        statuses: &[NoticeStatus],
    ) -> Result<Vec<DunningNotice>, PortError>;

    /// Applies `changes` atomically
    ///
    /// # Errors
    ///
    /// * `PortError::Conflict` if an updated row's version is stale, an
    ///   inserted id already exists or a deleted allocation is gone
    /// * `PortError::Validation` if a row belongs to another tenant
    async fn commit(&self, tenant: TenantId, changes: LedgerChangeSet) -> Result<(), PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::ChargeType;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn charge(tenant: TenantId, contract: Option<ContractId>, due: NaiveDate) -> Charge {
        Charge::new(
            tenant,
            contract,
            ChargeType::Deposit,
            "Deposit",
            Money::new(dec!(10), Currency::EUR),
            due,
        )
        .unwrap()
    }

    #[test]
    fn test_query_filters() {
        let tenant = TenantId::new();
        let contract = ContractId::new();
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let c = charge(tenant, Some(contract), jan);

        assert!(ChargeQuery::open().matches(&c));
        assert!(ChargeQuery::open().for_contract(contract).matches(&c));
        assert!(!ChargeQuery::open().for_contract(ContractId::new()).matches(&c));
        assert!(ChargeQuery::default().due_between(jan, jan).matches(&c));
        assert!(!ChargeQuery::default()
            .due_between(jan.succ_opt().unwrap(), jan.succ_opt().unwrap())
            .matches(&c));

        let without_contract = charge(tenant, None, jan);
        assert!(!ChargeQuery::open().for_contract(contract).matches(&without_contract));
    }

    #[test]
    fn test_change_set_keeps_latest_copy() {
        let tenant = TenantId::new();
        let mut c = charge(tenant, None, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let mut changes = LedgerChangeSet::new();

        changes.insert_charge(c.clone());
        c.title = "Deposit (corrected)".to_string();
        changes.update_charge(c.clone());

        assert_eq!(changes.inserted_charges().len(), 1);
        assert!(changes.updated_charges().is_empty());
        assert_eq!(changes.inserted_charges()[0].title, "Deposit (corrected)");
        assert!(changes.ensure_tenant(tenant).is_ok());
        assert!(changes.ensure_tenant(TenantId::new()).is_err());
    }
}
