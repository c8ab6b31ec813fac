//! CLI error handling

use thiserror::Error;

use core_kernel::CoreError;
use domain_receivables::{ErrorKind, ReceivablesError};
use infra_db::DatabaseError;

/// Errors surfaced by an operator command
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Receivables(#[from] ReceivablesError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl OpsError {
    /// Process exit code, following the BSD `sysexits` conventions
    pub fn exit_code(&self) -> i32 {
        match self {
            OpsError::Configuration(_) => 78,
            OpsError::Database(e) if e.is_connection_error() => 69,
            OpsError::Database(_) => 74,
            OpsError::Receivables(e) => match e.kind() {
                ErrorKind::Conflict => 75,
                ErrorKind::NotFound | ErrorKind::Validation | ErrorKind::PreconditionFailed => 65,
                _ => 70,
            },
            OpsError::Output(_) => 74,
        }
    }
}

impl From<CoreError> for OpsError {
    fn from(error: CoreError) -> Self {
        OpsError::Configuration(error.to_string())
    }
}

impl From<config::ConfigError> for OpsError {
    fn from(error: config::ConfigError) -> Self {
        OpsError::Configuration(error.to_string())
    }
}
