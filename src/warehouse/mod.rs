//! Warehouse backend abstraction
//!
//! This module provides the connection layer the ETL engine drives:
//! - DuckDB: embedded warehouse for local runs and tests
//! - PostgreSQL: network warehouse, also used for Redshift clusters
//!
//! Every component receives the same backend by reference from the
//! orchestrator and awaits each call before issuing the next one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendType;
use crate::models::{FieldValue, RawRow};

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbWarehouse;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresWarehouse;

pub use schema::WarehouseSchema;

/// Error type for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to connect to the warehouse
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A NOT NULL column received a null value
    #[error("Not-null constraint violated: {0}")]
    NotNullViolation(String),

    /// Transaction could not be started, committed or rolled back
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Backend configuration is unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WarehouseError {
    /// True for the constraint failure loaders may treat as a recoverable skip
    pub fn is_not_null_violation(&self) -> bool {
        matches!(self, WarehouseError::NotNullViolation(_))
    }
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Query result set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<RawRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in the first row, NULL when there is no row
    pub fn first_value(&self, column: &str) -> FieldValue {
        self.rows
            .first()
            .and_then(|row| row.get(column))
            .cloned()
            .unwrap_or(FieldValue::Null)
    }

    /// First column of the first row as an integer, for `COUNT(*)` style queries
    pub fn scalar_i64(&self) -> Option<i64> {
        let column = self.columns.first()?;
        self.first_value(column).as_i64()
    }
}

/// Warehouse backend trait
///
/// Implemented by every target the ETL engine can load into. The engine is
/// strictly sequential: one statement at a time over a single connection.
#[async_trait(?Send)]
pub trait Warehouse: Send + Sync {
    /// Execute a single statement that returns no rows
    ///
    /// # Returns
    /// Number of rows affected
    async fn execute(&self, sql: &str) -> WarehouseResult<u64>;

    /// Execute several `;`-separated statements, e.g. DDL scripts
    async fn execute_batch(&self, sql: &str) -> WarehouseResult<()>;

    /// Execute a query and return its rows
    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult>;

    /// Execute statements inside one transaction
    ///
    /// Either every statement is committed or none is: the first failure
    /// rolls the transaction back and is returned.
    async fn execute_transaction(&self, statements: &[String]) -> WarehouseResult<()>;

    /// Check if the warehouse is reachable
    async fn health_check(&self) -> WarehouseResult<bool>;

    /// SQL dialect spoken by this backend
    fn backend_type(&self) -> BackendType;

    /// Close the connection
    async fn close(&self) -> WarehouseResult<()>;
}
