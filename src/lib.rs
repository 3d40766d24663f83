//! Songplay Warehouse - ETL from raw song and listening-event logs into a
//! star schema
//!
//! Provides:
//! - Staging of raw JSON logs (bulk copy)
//! - Dimension and fact loading with dollar-quoted literals
//! - Foreign-key resolution by natural keys
//! - Deduplication of the dimension tables
//! - Warehouse backends (Redshift/PostgreSQL, DuckDB)

pub mod config;
pub mod dedup;
pub mod error;
pub mod format;
pub mod loader;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod staging;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{BackendType, EtlConfig, LoggingSection, StagingSection, WarehouseSection};
pub use dedup::{DedupStats, DedupTarget, Deduplicator};
pub use error::{ErrorClass, EtlError, EtlResult};
pub use format::{FormattedRow, dollar_quote, format_row, format_value};
pub use loader::{FactKeys, LoadOutcome, Loader};
pub use orchestrator::{FactOutcome, Orchestrator, RunReport, RunState};
pub use resolver::{RelationshipResolver, ResolvedKeys};

// Re-export models
pub use models::{FactCandidate, FieldValue, RawRow, StagingEventRow, StagingSongRow, TimeRow};

// Re-export warehouse types
#[cfg(feature = "duckdb-backend")]
pub use warehouse::DuckDbWarehouse;
#[cfg(feature = "postgres-backend")]
pub use warehouse::PostgresWarehouse;
pub use warehouse::{QueryResult, Warehouse, WarehouseError, WarehouseResult, WarehouseSchema};
