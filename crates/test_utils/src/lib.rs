//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! receivables test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common entities
//! - `builders`: Builder patterns for charges, payments and the tenancy directory
//! - `harness`: In-memory ledger wired to all three engines
//! - `database`: Database test helpers and container management
//! - `assertions`: Ledger invariant assertions
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod harness;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use harness::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;

/// Installs a test-writer tracing subscriber once per test binary
///
/// Honours `RUST_LOG`; later calls are no-ops.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
