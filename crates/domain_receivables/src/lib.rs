//! Receivables Domain - Charge Ledger, Payment Reconciliation and Dunning
//!
//! This crate turns incoming bank payments into settled rent charges and
//! escalates unpaid charges through a dunning process.
//!
//! # Engines
//!
//! - **Allocation**: applies payment money to charges, spreading
//!   recurring rent over its components with a priority waterfall; supports
//!   reversal, atomic multi-way splits and credit-balance application
//! - **Auto-match**: ordered heuristic rules attribute an unclear payment to
//!   exactly one charge; also handles bounced payments
//! - **Dunning**: late fees, simple daily default interest and escalating
//!   notices whose fees become new charges
//!
//! # Invariants
//!
//! - `0 ≤ covered_total ≤ total` for every charge, per component as well
//! - allocated plus credited never exceeds a payment's amount
//! - statuses are derived from amounts after every mutation
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_receivables::{AllocationService, RequestContext};
//!
//! let service = AllocationService::new(store, audit, config.waterfall_priority.clone());
//! let ctx = RequestContext::new(tenant_id);
//!
//! let allocation = service.allocate(&ctx, payment_id, charge_id, amount).await?;
//! service.reverse(&ctx, allocation.id).await?;
//! ```

pub mod allocation;
pub mod audit;
pub mod charge;
pub mod config;
pub mod context;
pub mod credit;
pub mod directory;
pub mod documents;
pub mod dunning;
pub mod error;
pub mod match_rules;
pub mod memory;
pub mod payment;
pub mod services;
pub mod store;
pub mod waterfall;

pub use allocation::{Allocation, AllocationRequest, AllocationSource};
pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use charge::{
    Charge, ChargeComponent, ChargeOrigin, ChargeStatus, ChargeType, ComponentLine,
    NoticeChargeKind,
};
pub use config::ReceivablesConfig;
pub use context::RequestContext;
pub use credit::CreditBalance;
pub use directory::{
    AllocationOrder, Contract, Renter, TenancyDirectory, TenantPreferences, Unit,
};
pub use documents::NoticeDocumentGenerator;
pub use dunning::{
    DunningNotice, DunningStage, EscalationSuggestion, EscalationThresholds, InterestTerms,
    LateFeeSchedule, NoticeStatus,
};
pub use error::{ErrorKind, ReceivablesError, ReceivablesResult};
pub use match_rules::{MatchContext, MatchRule, MatchRuleKind, RuleMatch};
pub use memory::{MemoryLedgerStore, MemoryTenancyDirectory};
pub use payment::{Payment, PaymentStatus};
pub use services::{
    AllocationService, AutoMatchFailure, AutoMatchOutcome, AutoMatchService, AutoMatchSummary,
    ChargebackOutcome, DunningService, SplitPart,
};
pub use store::{ChargeQuery, LedgerChangeSet, LedgerStore};
pub use waterfall::{apply_waterfall, ComponentShare, WaterfallPriority};
