//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the receivables engine, built on SQLx.
//!
//! # Architecture
//!
//! - [`repositories`] own the SQL and map rows to domain values
//! - [`adapters`] implement the `LedgerStore` and `TenancyDirectory` ports
//!   on top of the repositories
//! - [`migrate`] applies the embedded schema
//!
//! # Concurrency
//!
//! Charges, payments, credit balances and dunning notices carry a version.
//! A committed change set updates each row only if its stored version still
//! equals the one it was read at, and bumps it by one. A concurrent writer
//! therefore surfaces as `PortError::Conflict` and the whole change set is
//! rolled back.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/receivables")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod migrate;
pub mod pool;
pub mod repositories;
pub mod rows;

pub use adapters::{PostgresLedgerStore, PostgresTenancyDirectory};
pub use error::DatabaseError;
pub use migrate::run_migrations;
pub use pool::{create_pool, DatabaseConfig};
pub use repositories::{LedgerRepository, TenancyRepository};
