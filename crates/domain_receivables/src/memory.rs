//! In-memory adapters
//!
//! Used by tests and by embedders that keep the ledger in process. The
//! ledger store serialises commits under one write lock and validates the
//! whole change set before applying any of it.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use core_kernel::{
    AllocationId, ChargeId, ContractId, CreditBalanceId, DomainPort, DunningNoticeId,
    HealthCheckResult, HealthCheckable, PaymentId, PortError, TenantId,
};

use crate::allocation::Allocation;
use crate::charge::Charge;
use crate::credit::CreditBalance;
use crate::directory::{Contract, Renter, TenancyDirectory, TenantPreferences, Unit};
use crate::dunning::{DunningNotice, NoticeStatus};
use crate::payment::{Payment, PaymentStatus};
use crate::store::{ChargeQuery, LedgerChangeSet, LedgerStore};

#[derive(Debug, Default)]
struct LedgerState {
    charges: HashMap<ChargeId, Charge>,
    payments: HashMap<PaymentId, Payment>,
    allocations: HashMap<AllocationId, Allocation>,
    credits: HashMap<CreditBalanceId, CreditBalance>,
    notices: HashMap<DunningNoticeId, DunningNotice>,
}

/// Rows carrying a tenant and an optimistic version
trait Versioned {
    fn tenant(&self) -> TenantId;
    fn version(&self) -> u64;
    fn bump(&mut self);
}

macro_rules! versioned {
    ($($ty:ty),*) => {
        $(impl Versioned for $ty {
            fn tenant(&self) -> TenantId {
                self.tenant_id
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn bump(&mut self) {
                self.version += 1;
            }
        })*
    };
}

versioned!(Charge, Payment, CreditBalance, DunningNotice);

fn check_insert<K, V>(rows: &HashMap<K, V>, id: &K, entity: &str) -> Result<(), PortError>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    if rows.contains_key(id) {
        return Err(PortError::conflict(format!("{} {} already exists", entity, id)));
    }
    Ok(())
}

fn check_update<K, V>(
    rows: &HashMap<K, V>,
    id: &K,
    row: &V,
    tenant: TenantId,
    entity: &str,
) -> Result<(), PortError>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
    V: Versioned,
{
    match rows.get(id) {
        Some(stored) if stored.tenant() == tenant && stored.version() == row.version() => Ok(()),
        Some(stored) if stored.tenant() == tenant => Err(PortError::conflict(format!(
            "{} {} was modified concurrently (read version {}, stored {})",
            entity,
            id,
            row.version(),
            stored.version()
        ))),
        _ => Err(PortError::not_found(entity, id)),
    }
}

fn apply_update<K, V>(rows: &mut HashMap<K, V>, id: K, mut row: V)
where
    K: std::hash::Hash + Eq,
    V: Versioned,
{
    row.bump();
    rows.insert(id, row);
}

impl LedgerState {
    fn validate(&self, tenant: TenantId, changes: &LedgerChangeSet) -> Result<(), PortError> {
        changes.ensure_tenant(tenant)?;

        for c in changes.inserted_charges() {
            check_insert(&self.charges, &c.id, "Charge")?;
        }
        for c in changes.updated_charges() {
            check_update(&self.charges, &c.id, c, tenant, "Charge")?;
        }
        for p in changes.inserted_payments() {
            check_insert(&self.payments, &p.id, "Payment")?;
        }
        for p in changes.updated_payments() {
            check_update(&self.payments, &p.id, p, tenant, "Payment")?;
        }
        for a in changes.inserted_allocations() {
            check_insert(&self.allocations, &a.id, "Allocation")?;
        }
        for id in changes.deleted_allocations() {
            match self.allocations.get(id) {
                Some(a) if a.tenant_id == tenant => {}
                _ => {
                    return Err(PortError::conflict(format!(
                        "Allocation {} no longer exists",
                        id
                    )))
                }
            }
        }
        for c in changes.inserted_credits() {
            check_insert(&self.credits, &c.id, "CreditBalance")?;
        }
        for c in changes.updated_credits() {
            check_update(&self.credits, &c.id, c, tenant, "CreditBalance")?;
        }
        for n in changes.inserted_notices() {
            check_insert(&self.notices, &n.id, "DunningNotice")?;
        }
        for n in changes.updated_notices() {
            check_update(&self.notices, &n.id, n, tenant, "DunningNotice")?;
        }
        Ok(())
    }

    fn apply(&mut self, changes: LedgerChangeSet) {
        for c in changes.inserted_charges() {
            self.charges.insert(c.id, c.clone());
        }
        for c in changes.updated_charges() {
            apply_update(&mut self.charges, c.id, c.clone());
        }
        for p in changes.inserted_payments() {
            self.payments.insert(p.id, p.clone());
        }
        for p in changes.updated_payments() {
            apply_update(&mut self.payments, p.id, p.clone());
        }
        for id in changes.deleted_allocations() {
            self.allocations.remove(id);
        }
        for a in changes.inserted_allocations() {
            self.allocations.insert(a.id, a.clone());
        }
        for c in changes.inserted_credits() {
            self.credits.insert(c.id, c.clone());
        }
        for c in changes.updated_credits() {
            apply_update(&mut self.credits, c.id, c.clone());
        }
        for n in changes.inserted_notices() {
            self.notices.insert(n.id, n.clone());
        }
        for n in changes.updated_notices() {
            apply_update(&mut self.notices, n.id, n.clone());
        }
    }
}

/// In-memory [`LedgerStore`]
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for MemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for MemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-ledger-store")
    }
}

fn scoped<T: Clone>(
    row: Option<&T>,
    tenant: TenantId,
    tenant_of: impl Fn(&T) -> TenantId,
) -> Option<T> {
    row.filter(|r| tenant_of(r) == tenant).cloned()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_charge(&self, tenant: TenantId, id: ChargeId) -> Result<Charge, PortError> {
        let state = self.state.read().await;
        scoped(state.charges.get(&id), tenant, |c| c.tenant_id)
            .ok_or_else(|| PortError::not_found("Charge", id))
    }

    async fn find_charges(
        &self,
        tenant: TenantId,
        query: &ChargeQuery,
    ) -> Result<Vec<Charge>, PortError> {
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| c.tenant_id == tenant && query.matches(c))
            .cloned()
            .collect();
        charges.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(charges)
    }

    async fn get_payment(&self, tenant: TenantId, id: PaymentId) -> Result<Payment, PortError> {
        let state = self.state.read().await;
        scoped(state.payments.get(&id), tenant, |p| p.tenant_id)
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    async fn find_payments_by_status(
        &self,
        tenant: TenantId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, PortError> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant && p.status == status)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.booking_date.cmp(&b.booking_date).then(a.id.cmp(&b.id)));
        Ok(payments)
    }

    async fn get_allocation(
        &self,
        tenant: TenantId,
        id: AllocationId,
    ) -> Result<Allocation, PortError> {
        let state = self.state.read().await;
        scoped(state.allocations.get(&id), tenant, |a| a.tenant_id)
            .ok_or_else(|| PortError::not_found("Allocation", id))
    }

    async fn allocations_for_payment(
        &self,
        tenant: TenantId,
        payment_id: PaymentId,
    ) -> Result<Vec<Allocation>, PortError> {
        let state = self.state.read().await;
        let mut allocations: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| a.tenant_id == tenant && a.payment_id == payment_id)
            .cloned()
            .collect();
        allocations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(allocations)
    }

    async fn get_credit_balance(
        &self,
        tenant: TenantId,
        id: CreditBalanceId,
    ) -> Result<CreditBalance, PortError> {
        let state = self.state.read().await;
        scoped(state.credits.get(&id), tenant, |c| c.tenant_id)
            .ok_or_else(|| PortError::not_found("CreditBalance", id))
    }

    async fn credit_balances_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<CreditBalance>, PortError> {
        let state = self.state.read().await;
        let mut credits: Vec<CreditBalance> = state
            .credits
            .values()
            .filter(|c| c.tenant_id == tenant && c.contract_id == contract_id)
            .cloned()
            .collect();
        credits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(credits)
    }

    async fn get_notice(
        &self,
        tenant: TenantId,
        id: DunningNoticeId,
    ) -> Result<DunningNotice, PortError> {
        let state = self.state.read().await;
        scoped(state.notices.get(&id), tenant, |n| n.tenant_id)
            .ok_or_else(|| PortError::not_found("DunningNotice", id))
    }

    async fn notices_for_contract(
        &self,
        tenant: TenantId,
        contract_id: ContractId,
    ) -> Result<Vec<DunningNotice>, PortError> {
        let state = self.state.read().await;
        let mut notices: Vec<DunningNotice> = state
            .notices
            .values()
            .filter(|n| n.tenant_id == tenant && n.contract_id == contract_id)
            .cloned()
            .collect();
        notices.sort_by(|a, b| {
            a.notice_date
                .cmp(&b.notice_date)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(notices)
    }

    async fn find_notices_by_status(
        &self,
        tenant: TenantId,
        statuses: &[NoticeStatus],
    ) -> Result<Vec<DunningNotice>, PortError> {
        let state = self.state.read().await;
        let mut notices: Vec<DunningNotice> = state
            .notices
            .values()
            .filter(|n| n.tenant_id == tenant && statuses.contains(&n.status))
            .cloned()
            .collect();
        notices.sort_by(|a, b| a.notice_date.cmp(&b.notice_date).then(a.id.cmp(&b.id)));
        Ok(notices)
    }

    async fn commit(&self, tenant: TenantId, changes: LedgerChangeSet) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        state.validate(tenant, &changes)?;
        state.apply(changes);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    units: Vec<Unit>,
    renters: Vec<Renter>,
    contracts: Vec<Contract>,
    preferences: HashMap<TenantId, TenantPreferences>,
}

/// In-memory [`TenancyDirectory`]
#[derive(Debug, Default)]
pub struct MemoryTenancyDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryTenancyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_unit(&self, unit: Unit) {
        self.state.write().await.units.push(unit);
    }

    pub async fn add_renter(&self, renter: Renter) {
        self.state.write().await.renters.push(renter);
    }

    pub async fn add_contract(&self, contract: Contract) {
        self.state.write().await.contracts.push(contract);
    }

    /// Replaces a stored contract, e.g. to record a move-out
    pub async fn update_contract(&self, contract: Contract) {
        let mut state = self.state.write().await;
        match state.contracts.iter_mut().find(|c| c.id == contract.id) {
            Some(existing) => *existing = contract,
            None => state.contracts.push(contract),
        }
    }

    pub async fn set_preferences(&self, tenant: TenantId, preferences: TenantPreferences) {
        self.state.write().await.preferences.insert(tenant, preferences);
    }
}

impl DomainPort for MemoryTenancyDirectory {}

#[async_trait]
impl HealthCheckable for MemoryTenancyDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-tenancy-directory")
    }
}

#[async_trait]
impl TenancyDirectory for MemoryTenancyDirectory {
    async fn get_contract(&self, tenant: TenantId, id: ContractId) -> Result<Contract, PortError> {
        self.state
            .read()
            .await
            .contracts
            .iter()
            .find(|c| c.id == id && c.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| PortError::not_found("Contract", id))
    }

    async fn list_units(&self, tenant: TenantId) -> Result<Vec<Unit>, PortError> {
        let state = self.state.read().await;
        Ok(state.units.iter().filter(|u| u.tenant_id == tenant).cloned().collect())
    }

    async fn list_renters(&self, tenant: TenantId) -> Result<Vec<Renter>, PortError> {
        let state = self.state.read().await;
        Ok(state.renters.iter().filter(|r| r.tenant_id == tenant).cloned().collect())
    }

    async fn list_contracts(&self, tenant: TenantId) -> Result<Vec<Contract>, PortError> {
        let state = self.state.read().await;
        Ok(state.contracts.iter().filter(|c| c.tenant_id == tenant).cloned().collect())
    }

    async fn preferences(&self, tenant: TenantId) -> Result<TenantPreferences, PortError> {
        let state = self.state.read().await;
        Ok(state.preferences.get(&tenant).copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::ChargeType;
    use chrono::NaiveDate;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn charge(tenant: TenantId) -> Charge {
        Charge::new(
            tenant,
            Some(ContractId::new()),
            ChargeType::Deposit,
            "Deposit",
            Money::new(dec!(300), Currency::EUR),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_commit_bumps_versions() {
        let store = MemoryLedgerStore::new();
        let tenant = TenantId::new();
        let c = charge(tenant);

        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(c.clone());
        store.commit(tenant, changes).await.unwrap();

        let mut stored = store.get_charge(tenant, c.id).await.unwrap();
        assert_eq!(stored.version, 0);

        stored.title = "Deposit unit 4".to_string();
        let mut changes = LedgerChangeSet::new();
        changes.update_charge(stored);
        store.commit(tenant, changes).await.unwrap();

        assert_eq!(store.get_charge(tenant, c.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_without_partial_writes() {
        let store = MemoryLedgerStore::new();
        let tenant = TenantId::new();
        let a = charge(tenant);
        let b = charge(tenant);

        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(a.clone());
        changes.insert_charge(b.clone());
        store.commit(tenant, changes).await.unwrap();

        let mut first = store.get_charge(tenant, a.id).await.unwrap();
        first.title = "first writer".to_string();
        let mut changes = LedgerChangeSet::new();
        changes.update_charge(first);
        store.commit(tenant, changes).await.unwrap();

        let mut fresh_b = store.get_charge(tenant, b.id).await.unwrap();
        fresh_b.title = "second writer".to_string();
        let mut stale_a = a.clone();
        stale_a.title = "second writer".to_string();
        let mut changes = LedgerChangeSet::new();
        changes.update_charge(fresh_b);
        changes.update_charge(stale_a);

        let err = store.commit(tenant, changes).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get_charge(tenant, b.id).await.unwrap().title, "Deposit");
        assert_eq!(store.get_charge(tenant, a.id).await.unwrap().title, "first writer");
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped() {
        let store = MemoryLedgerStore::new();
        let tenant = TenantId::new();
        let c = charge(tenant);
        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(c.clone());
        store.commit(tenant, changes).await.unwrap();

        let err = store.get_charge(TenantId::new(), c.id).await.unwrap_err();
        assert!(err.is_not_found());

        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(charge(tenant));
        assert!(store.commit(TenantId::new(), changes).await.is_err());
    }

    #[tokio::test]
    async fn test_directory_defaults_preferences() {
        let directory = MemoryTenancyDirectory::new();
        let prefs = directory.preferences(TenantId::new()).await.unwrap();
        assert_eq!(prefs, TenantPreferences::default());
        assert_eq!(directory.health_check().await.status, core_kernel::AdapterHealth::Healthy);
    }
}
