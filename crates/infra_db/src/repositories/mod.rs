//! Repository implementations
//!
//! Repositories own the SQL and map between database rows and domain
//! values. They speak [`DatabaseError`](crate::DatabaseError); the adapters
//! in [`crate::adapters`] translate to port errors.
//!
//! # Architecture
//!
//! - Every query is filtered by tenant
//! - Multi-row writes run in one transaction
//! - Ledger updates are guarded by the row version (optimistic concurrency)

pub mod directory;
pub mod ledger;

pub use directory::TenancyRepository;
pub use ledger::LedgerRepository;
