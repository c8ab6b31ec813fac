//! Port infrastructure
//!
//! The receivables services talk to storage, the tenancy directory and the
//! audit trail only through port traits that extend [`DomainPort`].
//! Adapters (PostgreSQL in `infra_db`, in-memory in the domain crate)
//! report failures as [`PortError`].
//!
//! ```text
//!   allocation / auto-match / dunning services
//!                      │
//!        LedgerStore, TenancyDirectory, AuditSink
//!             ▲                            ▲
//!   ┌─────────┴─────────┐        ┌─────────┴─────────┐
//!   │ PostgreSQL adapter│        │ in-memory adapter │
//!   └───────────────────┘        └───────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an adapter
#[derive(Debug, Error)]
pub enum PortError {
    /// Missing, or owned by another tenant
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// The adapter refused the data (constraint, foreign tenant row)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A row changed since it was read; nothing was written
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored value could not be decoded
    #[error("Transformation error: {message}")]
    Transformation { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict { message: message.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal { message: message.into() }
    }

    /// Re-running the whole operation may succeed
    ///
    /// A conflict is retryable after re-reading the rows; a lost
    /// connection is retryable as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker for port traits; ports are shared across tasks behind `Arc<dyn _>`
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Outcome of one adapter health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Healthy with zero latency, for adapters without I/O
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: AdapterHealth::Unhealthy,
            message: Some(message.into()),
            ..Self::healthy(adapter_id)
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

/// Tracing data carried alongside a request into audit events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationMetadata {
    /// Correlates the audit events of one bank import or scheduler run
    pub correlation_id: Option<String>,
    /// Calling system, e.g. "bank-import" or "receivables-ops"
    pub source_system: Option<String>,
}

impl OperationMetadata {
    pub fn from_source(source_system: impl Into<String>) -> Self {
        Self {
            source_system: Some(source_system.into()),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
