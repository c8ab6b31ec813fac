//! In-memory Ledger Harness
//!
//! Wires the memory adapters to the three engines so integration tests can
//! seed a ledger and exercise services without a database.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use core_kernel::{ChargeId, DomainPort, PaymentId, PortError, TenantId};
use domain_receivables::{
    AllocationService, AuditEvent, AuditSink, AutoMatchService, Charge, Contract, DunningNotice,
    DunningService, LedgerChangeSet, LedgerStore, MemoryAuditSink, MemoryLedgerStore,
    MemoryTenancyDirectory, NoticeDocumentGenerator, Payment, ReceivablesConfig, Renter,
    RequestContext, Unit,
};

use crate::builders::{ContractBuilder, RenterBuilder, UnitBuilder};

/// A tenant with its own memory store, directory and audit buffer
pub struct LedgerHarness {
    pub tenant: TenantId,
    pub ctx: RequestContext,
    pub store: Arc<MemoryLedgerStore>,
    pub directory: Arc<MemoryTenancyDirectory>,
    pub audit: Arc<MemoryAuditSink>,
    pub config: ReceivablesConfig,
}

impl Default for LedgerHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerHarness {
    /// Creates a harness for a fresh tenant with default configuration
    pub fn new() -> Self {
        Self::with_config(ReceivablesConfig::default())
    }

    pub fn with_config(config: ReceivablesConfig) -> Self {
        let tenant = TenantId::new();
        Self {
            tenant,
            ctx: RequestContext::new(tenant),
            store: Arc::new(MemoryLedgerStore::new()),
            directory: Arc::new(MemoryTenancyDirectory::new()),
            audit: Arc::new(MemoryAuditSink::new()),
            config,
        }
    }

    pub fn allocation_service(&self) -> AllocationService {
        AllocationService::new(
            self.store.clone(),
            self.audit.clone(),
            self.config.waterfall_priority.clone(),
        )
    }

    pub fn auto_match_service(&self) -> AutoMatchService {
        AutoMatchService::new(
            self.store.clone(),
            self.directory.clone(),
            self.audit.clone(),
            &self.config,
        )
    }

    pub fn dunning_service(&self) -> DunningService {
        DunningService::new(
            self.store.clone(),
            self.directory.clone(),
            self.audit.clone(),
            &self.config,
        )
    }

    /// Inserts a charge directly into the store
    pub async fn seed_charge(&self, charge: Charge) -> Charge {
        let mut changes = LedgerChangeSet::new();
        changes.insert_charge(charge.clone());
        self.store
            .commit(self.tenant, changes)
            .await
            .expect("seed charge");
        charge
    }

    /// Inserts a payment directly into the store
    pub async fn seed_payment(&self, payment: Payment) -> Payment {
        let mut changes = LedgerChangeSet::new();
        changes.insert_payment(payment.clone());
        self.store
            .commit(self.tenant, changes)
            .await
            .expect("seed payment");
        payment
    }

    /// Registers a unit, a renter with the given last name and an active
    /// contract between them
    pub async fn seed_tenancy(
        &self,
        unit_number: &str,
        last_name: &str,
    ) -> (Unit, Renter, Contract) {
        let unit = UnitBuilder::new(self.tenant).with_unit_number(unit_number).build();
        let renter = RenterBuilder::new(self.tenant).with_name("Alex", last_name).build();
        self.seed_contract_for(unit, renter).await
    }

    /// Registers the given unit and renter with an active contract
    pub async fn seed_contract_for(&self, unit: Unit, renter: Renter) -> (Unit, Renter, Contract) {
        let contract = ContractBuilder::new(self.tenant, unit.id, renter.id).build();
        self.directory.add_unit(unit.clone()).await;
        self.directory.add_renter(renter.clone()).await;
        self.directory.add_contract(contract.clone()).await;
        (unit, renter, contract)
    }

    pub async fn charge(&self, id: ChargeId) -> Charge {
        self.store.get_charge(self.tenant, id).await.expect("charge exists")
    }

    pub async fn payment(&self, id: PaymentId) -> Payment {
        self.store.get_payment(self.tenant, id).await.expect("payment exists")
    }
}

/// Audit sink that rejects every event
#[derive(Debug, Default)]
pub struct FailingAuditSink;

impl DomainPort for FailingAuditSink {}

impl AuditSink for FailingAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), PortError> {
        Err(PortError::connection("audit backend unavailable"))
    }
}

/// Document generator that remembers which notices it rendered
#[derive(Debug, Default)]
pub struct RecordingDocumentGenerator {
    generated: Mutex<Vec<DunningNotice>>,
}

impl RecordingDocumentGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated(&self) -> Vec<DunningNotice> {
        self.generated.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl DomainPort for RecordingDocumentGenerator {}

#[async_trait]
impl NoticeDocumentGenerator for RecordingDocumentGenerator {
    async fn generate(&self, _tenant: TenantId, notice: &DunningNotice) -> Result<(), PortError> {
        self.generated
            .lock()
            .map_err(|_| PortError::internal("generator lock poisoned"))?
            .push(notice.clone());
        Ok(())
    }
}

/// Document generator that always fails
#[derive(Debug, Default)]
pub struct FailingDocumentGenerator;

impl DomainPort for FailingDocumentGenerator {}

#[async_trait]
impl NoticeDocumentGenerator for FailingDocumentGenerator {
    async fn generate(&self, _tenant: TenantId, _notice: &DunningNotice) -> Result<(), PortError> {
        Err(PortError::connection("document service unavailable"))
    }
}
