//! Receivables operator CLI
//!
//! Library half of the `receivables-ops` binary: argument parsing,
//! configuration, tracing setup and the commands themselves. Keeping them
//! here lets tests drive the commands against in-memory adapters.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod telemetry;

pub use cli::{Cli, Command};
pub use commands::{
    health_report, operator_context, CloseReport, ClosedNotice, EscalationReport, HealthReport,
    MigrationReport, Operations,
};
pub use config::OpsConfig;
pub use error::OpsError;
pub use telemetry::init_tracing;
