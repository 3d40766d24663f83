//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::error::EtlError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load configuration {0}: {1}")]
    ConfigError(PathBuf, String),

    #[error("Failed to initialize logging: {0}")]
    LoggingError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Etl(#[from] EtlError),
}
