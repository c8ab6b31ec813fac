//! Database error types
//!
//! SQLx failures are classified by PostgreSQL error code into
//! [`DatabaseError`]. Adapters hand them to the domain as
//! [`PortError`](core_kernel::PortError), so services never see SQL.

use thiserror::Error;

use core_kernel::PortError;

/// Failure of a ledger or directory query
///
/// Variants follow the PostgreSQL error class so the adapters can tell a
/// lost race (retry) from bad data (reject) and from an outage.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot reach the ledger database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    /// Unique violation, e.g. inserting an id twice
    #[error("Duplicate row: {0}")]
    DuplicateEntry(String),

    /// Reference to a charge, payment or contract that does not exist
    #[error("Dangling reference: {0}")]
    ForeignKeyViolation(String),

    /// A ledger CHECK constraint (coverage, settled amounts, statuses)
    #[error("Ledger constraint violated: {0}")]
    ConstraintViolation(String),

    /// A versioned update or delete matched no row
    #[error("Stale version: {0}")]
    StaleVersion(String),

    #[error("Could not begin or commit the change set: {0}")]
    TransactionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value does not decode into a domain value
    #[error("Cannot decode stored value: {0}")]
    SerializationError(String),

    #[error("No pooled connection became available")]
    PoolExhausted,
}

impl DatabaseError {
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::stale("Charge", "CHG-123", 3);
    /// assert_eq!(error.to_string(), "Stale version: Charge 'CHG-123' is no longer at version 3");
    /// ```
    pub fn stale(entity: &str, id: impl std::fmt::Display, version: u64) -> Self {
        DatabaseError::StaleVersion(format!(
            "{} '{}' is no longer at version {}",
            entity, id, version
        ))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Losing a race against another writer
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::DuplicateEntry(_) | DatabaseError::StaleVersion(_))
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted)
    }
}

/// Maps SQLx errors to DatabaseError variants by PostgreSQL error code
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("query returned no row".to_string())
            }
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::SerializationError(error.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                Some("23503") => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                Some("23514") => DatabaseError::ConstraintViolation(db_err.message().to_string()),
                // serialization_failure under concurrent writers
                Some("40001") => DatabaseError::StaleVersion(db_err.message().to_string()),
                _ => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(message) => PortError::NotFound {
                entity_type: "Record".to_string(),
                id: message,
            },
            conflict if conflict.is_conflict() => PortError::conflict(conflict.to_string()),
            DatabaseError::ConstraintViolation(message)
            | DatabaseError::ForeignKeyViolation(message) => PortError::validation(message),
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::connection("connection pool exhausted"),
            DatabaseError::SerializationError(message) => PortError::transformation(message),
            other => PortError::internal(other.to_string()),
        }
    }
}
