//! ETL CLI commands
//!
//! Loads the configuration, opens the configured warehouse and hands it to
//! the orchestrator. Output is printed as JSON on stdout.

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::config::{BackendType, EtlConfig};
use crate::error::EtlError;
use crate::logging::init_logging;
use crate::orchestrator::Orchestrator;
use crate::warehouse::Warehouse;

/// What the binary was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtlAction {
    /// Full run: staging, dimensions, facts, dedup
    Run,
    /// Drop and recreate every table
    ResetSchema,
    /// Deduplication pass only
    Dedup,
}

/// ETL command arguments
#[derive(Debug, Clone)]
pub struct EtlArgs {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    pub action: EtlAction,
}

/// Execute an ETL command to completion
pub fn handle_etl(args: &EtlArgs) -> Result<(), CliError> {
    let config_path = EtlConfig::resolve_path(args.config.as_deref());
    let config = EtlConfig::load(&config_path)
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| CliError::ConfigError(config_path.clone(), e.to_string()))?;

    let log_file =
        init_logging(&config.logging).map_err(|e| CliError::LoggingError(e.to_string()))?;
    tracing::info!("Using configuration {}", config_path.display());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))?;

    let result = rt.block_on(dispatch(config, args.action));
    eprintln!("Log written to {}", log_file.display());

    println!("{}", result?);
    Ok(())
}

async fn dispatch(config: EtlConfig, action: EtlAction) -> Result<String, CliError> {
    match config.warehouse.backend {
        BackendType::DuckDb => dispatch_duckdb(config, action).await,
        BackendType::Redshift | BackendType::Postgres => dispatch_postgres(config, action).await,
    }
}

#[cfg(feature = "duckdb-backend")]
async fn dispatch_duckdb(config: EtlConfig, action: EtlAction) -> Result<String, CliError> {
    use crate::warehouse::DuckDbWarehouse;

    let warehouse = if config.warehouse.path == ":memory:" {
        DuckDbWarehouse::in_memory()
    } else {
        DuckDbWarehouse::new(&config.warehouse.path)
    }
    .map_err(EtlError::from)?;

    execute(Orchestrator::new(warehouse, config), action).await
}

#[cfg(not(feature = "duckdb-backend"))]
async fn dispatch_duckdb(_config: EtlConfig, _action: EtlAction) -> Result<String, CliError> {
    Err(CliError::InvalidArgument(
        "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
    ))
}

#[cfg(feature = "postgres-backend")]
async fn dispatch_postgres(config: EtlConfig, action: EtlAction) -> Result<String, CliError> {
    use crate::warehouse::PostgresWarehouse;

    let warehouse = PostgresWarehouse::connect(&config.warehouse)
        .await
        .map_err(EtlError::from)?;

    execute(Orchestrator::new(warehouse, config), action).await
}

#[cfg(not(feature = "postgres-backend"))]
async fn dispatch_postgres(_config: EtlConfig, _action: EtlAction) -> Result<String, CliError> {
    Err(CliError::InvalidArgument(
        "PostgreSQL backend not enabled. Build with --features postgres-backend".to_string(),
    ))
}

async fn execute<W: Warehouse>(
    mut orchestrator: Orchestrator<W>,
    action: EtlAction,
) -> Result<String, CliError> {
    let output = match action {
        EtlAction::Run => {
            let report = orchestrator.run().await?;
            serde_json::to_string_pretty(&report)
        }
        EtlAction::ResetSchema => {
            orchestrator.reset_schema().await?;
            serde_json::to_string_pretty(&serde_json::json!({
                "backend": orchestrator.warehouse().backend_type().to_string(),
                "schema": "reset",
            }))
        }
        EtlAction::Dedup => {
            let stats = orchestrator.run_dedup_only().await?;
            serde_json::to_string_pretty(&stats)
        }
    }
    .map_err(|e| CliError::SerializationError(e.to_string()))?;

    orchestrator
        .warehouse()
        .close()
        .await
        .map_err(EtlError::from)?;

    Ok(output)
}
