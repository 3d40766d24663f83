//! DuckDB warehouse backend implementation
//!
//! Embedded warehouse used for local runs and for the integration tests.
//! Staging tables can be filled straight from JSON files with
//! `read_json_auto`, so a full run needs no external services.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{QueryResult, Warehouse, WarehouseError, WarehouseResult};
use crate::config::BackendType;
use crate::models::{FieldValue, RawRow, START_TIME_FORMAT};

/// Message fragment DuckDB uses for NOT NULL failures
const NOT_NULL_MESSAGE: &str = "NOT NULL constraint failed";

/// DuckDB warehouse backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDbWarehouse {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDbWarehouse {
    /// Open (or create) a file-backed warehouse
    pub fn new(db_path: impl AsRef<Path>) -> WarehouseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory warehouse
    pub fn in_memory() -> WarehouseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> WarehouseResult<std::sync::MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Map a DuckDB error onto the warehouse error classes
    fn classify(error: duckdb::Error, context: &str) -> WarehouseError {
        let message = error.to_string();
        if message.contains(NOT_NULL_MESSAGE) {
            WarehouseError::NotNullViolation(message)
        } else {
            WarehouseError::QueryFailed(format!("{}: {}", context, message))
        }
    }

    fn row_to_raw(row: &duckdb::Row, columns: &[String]) -> RawRow {
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row
                    .get_ref(i)
                    .map(Self::value_ref_to_field)
                    .unwrap_or(FieldValue::Null);
                (name.clone(), value)
            })
            .collect()
    }

    /// Convert a DuckDB ValueRef to a field value
    fn value_ref_to_field(value: duckdb::types::ValueRef) -> FieldValue {
        use duckdb::types::{TimeUnit, ValueRef};

        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Boolean(b) => FieldValue::Text(b.to_string()),
            ValueRef::TinyInt(i) => FieldValue::Integer(i.into()),
            ValueRef::SmallInt(i) => FieldValue::Integer(i.into()),
            ValueRef::Int(i) => FieldValue::Integer(i.into()),
            ValueRef::BigInt(i) => FieldValue::Integer(i),
            ValueRef::HugeInt(i) => i64::try_from(i)
                .map(FieldValue::Integer)
                .unwrap_or_else(|_| FieldValue::Decimal(i.to_string())),
            ValueRef::UTinyInt(i) => FieldValue::Integer(i.into()),
            ValueRef::USmallInt(i) => FieldValue::Integer(i.into()),
            ValueRef::UInt(i) => FieldValue::Integer(i.into()),
            ValueRef::UBigInt(i) => i64::try_from(i)
                .map(FieldValue::Integer)
                .unwrap_or_else(|_| FieldValue::Decimal(i.to_string())),
            ValueRef::Float(f) => FieldValue::Float(f.into()),
            ValueRef::Double(f) => FieldValue::Float(f),
            ValueRef::Decimal(d) => FieldValue::Decimal(d.to_string()),
            ValueRef::Text(bytes) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Timestamp(unit, raw) => {
                let micros = match unit {
                    TimeUnit::Second => raw.saturating_mul(1_000_000),
                    TimeUnit::Millisecond => raw.saturating_mul(1_000),
                    TimeUnit::Microsecond => raw,
                    TimeUnit::Nanosecond => raw / 1_000,
                };
                chrono::DateTime::from_timestamp_micros(micros)
                    .map(|dt| {
                        FieldValue::Text(dt.naive_utc().format(START_TIME_FORMAT).to_string())
                    })
                    .unwrap_or(FieldValue::Null)
            }
            other => FieldValue::Text(format!("{:?}", other)),
        }
    }
}

#[async_trait(?Send)]
impl Warehouse for DuckDbWarehouse {
    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| Self::classify(e, "Execute failed"))
    }

    async fn execute_batch(&self, sql: &str) -> WarehouseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| Self::classify(e, "Batch execute failed"))
    }

    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = std::time::Instant::now();
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Self::classify(e, "Prepare failed"))?;

        // In DuckDB 1.4+, the query has to run before column names are known
        let mut result_rows = stmt
            .query([])
            .map_err(|e| Self::classify(e, "Query failed"))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| Self::classify(e, "Row fetch error"))?
        {
            rows.push(Self::row_to_raw(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_transaction(&self, statements: &[String]) -> WarehouseResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            WarehouseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        for sql in statements {
            // Dropping `tx` on the error path rolls back
            tx.execute_batch(sql)
                .map_err(|e| Self::classify(e, "Transaction statement failed"))?;
        }

        tx.commit().map_err(|e| {
            WarehouseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })
    }

    async fn health_check(&self) -> WarehouseResult<bool> {
        let result = self.query("SELECT 1 AS healthy").await?;
        Ok(!result.is_empty())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::DuckDb
    }

    async fn close(&self) -> WarehouseResult<()> {
        // The connection is closed when dropped
        Ok(())
    }
}
