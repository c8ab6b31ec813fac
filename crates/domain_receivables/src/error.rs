//! Receivables domain errors

use core_kernel::{ChargeId, CoreError, Money, MoneyError, PaymentId, PortError};
use thiserror::Error;

/// Coarse classification callers use to map failures onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing entity, or one that belongs to another tenant
    NotFound,
    /// Amounts that do not fit, split sums that do not match, bad input
    Validation,
    /// The ledger is not in a state that allows the operation
    PreconditionFailed,
    /// A ledger computation produced an impossible result
    ComputationInvariantViolation,
    /// Another writer changed a row first; the operation may be retried
    Conflict,
    /// Storage or collaborator failure
    Infrastructure,
}

/// Errors that can occur in the receivables domain
#[derive(Debug, Error)]
pub enum ReceivablesError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    #[error(
        "Insufficient payment balance on {payment_id}: requested {requested}, \
         available {available}, short by {shortfall}"
    )]
    InsufficientPaymentBalance {
        payment_id: PaymentId,
        requested: Money,
        available: Money,
        shortfall: Money,
    },

    #[error(
        "Amount exceeds outstanding balance of {charge_id}: requested {requested}, \
         outstanding {outstanding}, excess {excess}"
    )]
    ExceedsOutstandingCharge {
        charge_id: ChargeId,
        requested: Money,
        outstanding: Money,
        excess: Money,
    },

    #[error(
        "Split parts must sum to the payment amount: expected {expected}, \
         got {actual}, difference {difference}"
    )]
    SplitMismatch {
        expected: Money,
        actual: Money,
        difference: Money,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Ledger invariant violated: {0}")]
    ComputationInvariantViolation(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Port(PortError),
}

impl ReceivablesError {
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        ReceivablesError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ReceivablesError::Validation(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        ReceivablesError::PreconditionFailed(message.into())
    }

    /// Builds an invariant violation and logs it at error level
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(violation = %message, "ledger invariant violated");
        ReceivablesError::ComputationInvariantViolation(message)
    }

    /// Returns the error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReceivablesError::NotFound { .. } => ErrorKind::NotFound,
            ReceivablesError::InsufficientPaymentBalance { .. }
            | ReceivablesError::ExceedsOutstandingCharge { .. }
            | ReceivablesError::SplitMismatch { .. }
            | ReceivablesError::Validation(_)
            | ReceivablesError::Money(_) => ErrorKind::Validation,
            ReceivablesError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            ReceivablesError::ComputationInvariantViolation(_) => {
                ErrorKind::ComputationInvariantViolation
            }
            ReceivablesError::Conflict(_) => ErrorKind::Conflict,
            ReceivablesError::Configuration(_) | ReceivablesError::Port(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Returns true when retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ReceivablesError::Conflict(_) => true,
            ReceivablesError::Port(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<PortError> for ReceivablesError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => ReceivablesError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Conflict { message } => ReceivablesError::Conflict(message),
            other => ReceivablesError::Port(other),
        }
    }
}

impl From<CoreError> for ReceivablesError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Money(e) => ReceivablesError::Money(e),
            CoreError::Validation(m) => ReceivablesError::Validation(m),
            CoreError::Configuration(m) => ReceivablesError::Configuration(m),
        }
    }
}

/// Result alias for the receivables domain
pub type ReceivablesResult<T> = Result<T, ReceivablesError>;
