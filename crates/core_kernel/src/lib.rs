//! Core Kernel - Foundational types for the receivables engine
//!
//! This crate provides the building blocks shared by the domain and
//! infrastructure crates:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Port/adapter infrastructure and the common port error

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{
    TenantId, ContractId, UnitId, RenterId, ActorId,
    ChargeId, PaymentId, AllocationId, CreditBalanceId, DunningNoticeId,
    AuditEventId,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable,
    OperationMetadata,
};
