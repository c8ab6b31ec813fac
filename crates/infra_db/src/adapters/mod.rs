//! Port adapters
//!
//! PostgreSQL implementations of the receivables ports. Each adapter wraps
//! a repository, translates `DatabaseError` into `PortError` and reports
//! database health.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use infra_db::adapters::{PostgresLedgerStore, PostgresTenancyDirectory};
//!
//! let store = Arc::new(PostgresLedgerStore::new(pool.clone()));
//! let directory = Arc::new(PostgresTenancyDirectory::new(pool));
//! let matcher = AutoMatchService::new(store, directory, audit, &config);
//! ```

use sqlx::PgPool;

use core_kernel::HealthCheckResult;

pub mod directory;
pub mod ledger_store;

pub use directory::PostgresTenancyDirectory;
pub use ledger_store::PostgresLedgerStore;

/// Runs `SELECT 1` and reports the round trip
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();

    let result = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await;

    let latency_ms = start.elapsed().as_millis() as u64;

    let health = match result {
        Ok(_) => HealthCheckResult::healthy(adapter_id),
        Err(e) => HealthCheckResult::unhealthy(adapter_id, format!("Database error: {}", e)),
    };
    health.with_latency_ms(latency_ms)
}
