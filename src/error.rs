//! Run-level error types
//!
//! Recoverable skips (anonymous users, facts without a time anchor) never
//! surface here: loaders log and count them. Everything in [`EtlError`]
//! halts the run.

use crate::warehouse::WarehouseError;

/// How a fatal error is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A statement broke a table's schema contract
    FatalSchema,
    /// Connection, configuration or input failure
    FatalInfra,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::FatalSchema => write!(f, "fatal-schema"),
            ErrorClass::FatalInfra => write!(f, "fatal-infra"),
        }
    }
}

/// Error type for an ETL run
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system failure
    #[error("IO error: {0}")]
    Io(String),

    /// Warehouse failure outside any insert
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// An insert statement was rejected
    #[error("Insert into {table} failed: {source}")]
    Insert {
        table: String,
        statement: String,
        #[source]
        source: WarehouseError,
    },

    /// Event timestamp that cannot be turned into a time row
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// Bulk copy into the staging tables failed
    #[error("Staging load failed: {0}")]
    Staging(String),

    /// Deduplication of a table failed
    #[error("Deduplication of {table} failed: {source}")]
    Dedup {
        table: String,
        #[source]
        source: WarehouseError,
    },
}

impl EtlError {
    /// Classify the failure for reporting
    pub fn class(&self) -> ErrorClass {
        match self {
            EtlError::Insert { source, .. } | EtlError::Dedup { source, .. } => match source {
                WarehouseError::ConnectionFailed(_) => ErrorClass::FatalInfra,
                _ => ErrorClass::FatalSchema,
            },
            EtlError::Warehouse(WarehouseError::QueryFailed(_))
            | EtlError::Warehouse(WarehouseError::NotNullViolation(_)) => ErrorClass::FatalSchema,
            _ => ErrorClass::FatalInfra,
        }
    }

    /// Offending statement, when the error came from one
    pub fn statement(&self) -> Option<&str> {
        match self {
            EtlError::Insert { statement, .. } => Some(statement),
            _ => None,
        }
    }
}

/// Result type for ETL operations
pub type EtlResult<T> = Result<T, EtlError>;
