//! PostgreSQL warehouse backend implementation
//!
//! Speaks the PostgreSQL wire protocol, which also covers Redshift clusters.
//! A single client is shared behind an async mutex; the connection task runs
//! on the caller's tokio runtime.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;

use super::{QueryResult, Warehouse, WarehouseError, WarehouseResult};
use crate::config::{BackendType, WarehouseSection};
use crate::models::{FieldValue, RawRow, START_TIME_FORMAT};

/// Redshift reports NOT NULL failures without a SQLSTATE
const REDSHIFT_NOT_NULL_MESSAGE: &str = "Cannot insert a NULL value";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL / Redshift warehouse backend
pub struct PostgresWarehouse {
    /// `host:port/database`, without credentials
    endpoint: String,
    /// Dialect of the server behind the connection
    backend: BackendType,
    /// PostgreSQL client (wrapped for async access)
    client: Arc<Mutex<tokio_postgres::Client>>,
}

impl PostgresWarehouse {
    /// Connect using the `[warehouse]` section
    pub async fn connect(section: &WarehouseSection) -> WarehouseResult<Self> {
        if !section.backend.is_network() {
            return Err(WarehouseError::ConfigError(format!(
                "Backend {} is not reachable over the PostgreSQL protocol",
                section.backend
            )));
        }

        let mut config = tokio_postgres::Config::new();
        config
            .host(&section.host)
            .port(section.port)
            .dbname(&section.database)
            .user(&section.user)
            .password(&section.password)
            .connect_timeout(CONNECT_TIMEOUT);

        let (client, connection) = config.connect(tokio_postgres::NoTls).await.map_err(|e| {
            WarehouseError::ConnectionFailed(format!(
                "Failed to connect to {}: {}",
                section.endpoint(),
                Self::describe(&e)
            ))
        })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Warehouse connection error: {}", e);
            }
        });

        tracing::info!("Connected to {} warehouse at {}", section.backend, section.endpoint());

        Ok(Self {
            endpoint: section.endpoint(),
            backend: section.backend,
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Get the endpoint (credentials are never part of it)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Server message when available, the client error otherwise
    fn describe(error: &tokio_postgres::Error) -> String {
        error
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| error.to_string())
    }

    /// Map a client error onto the warehouse error classes
    fn classify(error: tokio_postgres::Error, context: &str) -> WarehouseError {
        let message = Self::describe(&error);
        if error.code() == Some(&SqlState::NOT_NULL_VIOLATION)
            || message.contains(REDSHIFT_NOT_NULL_MESSAGE)
        {
            WarehouseError::NotNullViolation(message)
        } else if error.is_closed() {
            WarehouseError::ConnectionFailed(message)
        } else {
            WarehouseError::QueryFailed(format!("{}: {}", context, message))
        }
    }

    fn row_to_raw(row: &tokio_postgres::Row) -> RawRow {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name().to_string(), Self::get_column_value(row, i)))
            .collect()
    }

    /// Get a column value, trying the types the star schema uses
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> FieldValue {
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v.map(i64::from).into();
        }
        if let Ok(v) = row.try_get::<_, Option<Decimal>>(idx) {
            return numeric_field(v);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<_, Option<f32>>(idx) {
            return v.map(f64::from).into();
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            return v
                .map(|ts| ts.format(START_TIME_FORMAT).to_string())
                .into();
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v.map(|b| b.to_string()).into();
        }

        tracing::debug!(
            "Unsupported column type {} for {}",
            row.columns()[idx].type_(),
            row.columns()[idx].name()
        );
        FieldValue::Null
    }
}

/// NUMERIC keeps its textual form, scale included
fn numeric_field(value: Option<Decimal>) -> FieldValue {
    value
        .map(|d| FieldValue::Decimal(d.to_string()))
        .unwrap_or(FieldValue::Null)
}

#[async_trait(?Send)]
impl Warehouse for PostgresWarehouse {
    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let client = self.client.lock().await;
        client
            .execute(sql, &[])
            .await
            .map_err(|e| Self::classify(e, "Execute failed"))
    }

    async fn execute_batch(&self, sql: &str) -> WarehouseResult<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| Self::classify(e, "Batch execute failed"))
    }

    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = std::time::Instant::now();
        let client = self.client.lock().await;

        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| Self::classify(e, "Query failed"))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        Ok(QueryResult {
            columns,
            rows: rows.iter().map(Self::row_to_raw).collect(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_transaction(&self, statements: &[String]) -> WarehouseResult<()> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(|e| {
            WarehouseError::TransactionFailed(format!(
                "Failed to begin transaction: {}",
                Self::describe(&e)
            ))
        })?;

        for sql in statements {
            // Dropping `tx` on the error path rolls back
            tx.batch_execute(sql)
                .await
                .map_err(|e| Self::classify(e, "Transaction statement failed"))?;
        }

        tx.commit().await.map_err(|e| {
            WarehouseError::TransactionFailed(format!(
                "Failed to commit transaction: {}",
                Self::describe(&e)
            ))
        })
    }

    async fn health_check(&self) -> WarehouseResult<bool> {
        let result = self.query("SELECT 1 AS healthy").await?;
        Ok(!result.is_empty())
    }

    fn backend_type(&self) -> BackendType {
        self.backend
    }

    async fn close(&self) -> WarehouseResult<()> {
        // The connection task ends once the client is dropped
        Ok(())
    }
}
