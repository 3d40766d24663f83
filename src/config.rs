//! ETL configuration file support
//!
//! Handles parsing of `dwh.toml` configuration files and environment
//! variable overrides. The configuration is loaded once at startup and
//! handed to the orchestrator as an immutable value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EtlError, EtlResult};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "dwh.toml";

/// Default DuckDB warehouse file
pub const DEFAULT_DUCKDB_FILENAME: &str = "sparkify.duckdb";

/// Environment variable naming the configuration file
pub const ENV_CONFIG_PATH: &str = "SONGPLAY_CONFIG";

/// Environment variable for the warehouse backend
pub const ENV_WAREHOUSE_BACKEND: &str = "SONGPLAY_WAREHOUSE_BACKEND";

/// Environment variable for the warehouse endpoint
pub const ENV_WAREHOUSE_HOST: &str = "SONGPLAY_WAREHOUSE_HOST";

/// Environment variable for the warehouse port
pub const ENV_WAREHOUSE_PORT: &str = "SONGPLAY_WAREHOUSE_PORT";

/// Environment variable for the database name
pub const ENV_WAREHOUSE_DATABASE: &str = "SONGPLAY_WAREHOUSE_DATABASE";

/// Environment variable for the warehouse user
pub const ENV_WAREHOUSE_USER: &str = "SONGPLAY_WAREHOUSE_USER";

/// Environment variable for the warehouse password
pub const ENV_WAREHOUSE_PASSWORD: &str = "SONGPLAY_WAREHOUSE_PASSWORD";

/// Environment variable for the DuckDB file path
pub const ENV_DUCKDB_PATH: &str = "SONGPLAY_DUCKDB_PATH";

/// Environment variable for the log level
pub const ENV_LOG_LEVEL: &str = "SONGPLAY_LOG_LEVEL";

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Amazon Redshift over the PostgreSQL wire protocol (default)
    #[default]
    Redshift,
    /// PostgreSQL database
    Postgres,
    /// DuckDB embedded database
    #[serde(rename = "duckdb")]
    DuckDb,
}

impl BackendType {
    /// True for backends reached over the network
    pub fn is_network(&self) -> bool {
        !matches!(self, BackendType::DuckDb)
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redshift" => Ok(BackendType::Redshift),
            "postgres" | "postgresql" => Ok(BackendType::Postgres),
            "duckdb" => Ok(BackendType::DuckDb),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'redshift', 'postgres' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Redshift => write!(f, "redshift"),
            BackendType::Postgres => write!(f, "postgres"),
            BackendType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Warehouse connection section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSection {
    /// Warehouse backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Cluster endpoint
    #[serde(default)]
    pub host: String,

    /// Cluster port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// DuckDB file; `:memory:` for an in-memory warehouse
    #[serde(default = "default_duckdb_path")]
    pub path: String,
}

fn default_port() -> u16 {
    5439
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            host: String::new(),
            port: default_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            path: default_duckdb_path(),
        }
    }
}

impl WarehouseSection {
    /// `host:port/database`, never including credentials
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Staging source section
///
/// Consumed only by the bulk-copy step. For Redshift these are object-storage
/// URLs; for DuckDB they are local file globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSection {
    /// Listening-event source
    #[serde(default)]
    pub log_data: Option<String>,

    /// JSONPaths file mapping event fields to columns
    #[serde(default)]
    pub log_json_path: Option<String>,

    /// Song-catalog source
    #[serde(default)]
    pub song_data: Option<String>,

    /// IAM role the cluster assumes to read the sources
    #[serde(default)]
    pub iam_role_arn: Option<String>,

    /// Region of the source bucket
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            log_data: None,
            log_json_path: None,
            song_data: None,
            iam_role_arn: None,
            region: default_region(),
        }
    }
}

impl StagingSection {
    /// True when at least one source is configured
    pub fn has_sources(&self) -> bool {
        self.log_data.is_some() || self.song_data.is_some()
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Directory receiving one log file per day
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Default level filter
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `dwh.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EtlConfig {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub staging: StagingSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl EtlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DuckDB configuration
    pub fn duckdb(path: impl Into<String>) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: BackendType::DuckDb,
                path: path.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a file and apply environment overrides
    ///
    /// A missing file falls back to defaults so that a fully
    /// environment-driven setup works without one.
    pub fn load(config_path: &Path) -> EtlResult<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path).map_err(|e| {
                EtlError::Io(format!(
                    "Failed to read config {}: {}",
                    config_path.display(),
                    e
                ))
            })?;

            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Resolve the configuration path from an explicit value, the environment
    /// or the default filename, in that order
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILENAME))
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> EtlResult<Self> {
        toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a file
    pub fn save(&self, config_path: &Path) -> EtlResult<()> {
        let content = self.to_toml()?;

        std::fs::write(config_path, content)
            .map_err(|e| EtlError::Io(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> EtlResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EtlError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_WAREHOUSE_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.warehouse.backend = backend_type;
        }

        if let Ok(host) = std::env::var(ENV_WAREHOUSE_HOST) {
            self.warehouse.host = host;
        }

        if let Ok(port) = std::env::var(ENV_WAREHOUSE_PORT)
            && let Ok(port) = port.parse()
        {
            self.warehouse.port = port;
        }

        if let Ok(database) = std::env::var(ENV_WAREHOUSE_DATABASE) {
            self.warehouse.database = database;
        }

        if let Ok(user) = std::env::var(ENV_WAREHOUSE_USER) {
            self.warehouse.user = user;
        }

        if let Ok(password) = std::env::var(ENV_WAREHOUSE_PASSWORD) {
            self.warehouse.password = password;
        }

        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.warehouse.path = path;
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    /// Check that the configuration is complete enough for a run
    pub fn validate(&self) -> EtlResult<()> {
        let warehouse = &self.warehouse;

        if warehouse.backend.is_network() {
            let missing: Vec<&str> = [
                ("host", &warehouse.host),
                ("database", &warehouse.database),
                ("user", &warehouse.user),
            ]
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                return Err(EtlError::Config(format!(
                    "[warehouse] is missing {} for backend {}",
                    missing.join(", "),
                    warehouse.backend
                )));
            }
        } else if warehouse.path.trim().is_empty() {
            return Err(EtlError::Config(
                "[warehouse] path is required for backend duckdb".to_string(),
            ));
        }

        if warehouse.backend == BackendType::Redshift && self.staging.has_sources() {
            let staging = &self.staging;
            if staging.iam_role_arn.is_none() {
                return Err(EtlError::Config(
                    "[staging] iam_role_arn is required to copy into Redshift".to_string(),
                ));
            }
            if staging.log_data.is_some() && staging.log_json_path.is_none() {
                return Err(EtlError::Config(
                    "[staging] log_json_path is required when log_data is set".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Songplay warehouse ETL configuration

[warehouse]
# Warehouse backend: "redshift" (default), "postgres" or "duckdb"
backend = "redshift"
host = "sparkify.abc123.us-west-2.redshift.amazonaws.com"
port = 5439
database = "dev"
user = "awsuser"
# password = "..."   # or SONGPLAY_WAREHOUSE_PASSWORD

# DuckDB file (used when backend = "duckdb")
path = "sparkify.duckdb"

[staging]
log_data = "s3://udacity-dend/log_data"
log_json_path = "s3://udacity-dend/log_json_path.json"
song_data = "s3://udacity-dend/song_data"
iam_role_arn = "arn:aws:iam::123456789012:role/dwhRole"
region = "us-west-2"

[logging]
directory = "logs"
level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EtlConfig::new();
        assert_eq!(config.warehouse.backend, BackendType::Redshift);
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.warehouse.path, DEFAULT_DUCKDB_FILENAME);
        assert_eq!(config.staging.region, "us-west-2");
        assert_eq!(config.logging.directory, PathBuf::from("logs"));
        assert_eq!(config.logging.level, "info");
        assert!(!config.staging.has_sources());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[warehouse]
backend = "postgres"
host = "localhost"
port = 5432
database = "sparkify"
user = "student"
password = "student"

[logging]
level = "debug"
"#;
        let config = EtlConfig::parse(toml).unwrap();
        assert_eq!(config.warehouse.backend, BackendType::Postgres);
        assert_eq!(config.warehouse.port, 5432);
        assert_eq!(config.warehouse.endpoint(), "localhost:5432/sparkify");
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        let toml = "[warehouse]\nbackend = \"oracle\"\n";
        assert!(matches!(EtlConfig::parse(toml), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = EtlConfig::duckdb("local.duckdb");

        config.save(&path).unwrap();
        let loaded = EtlConfig::load(&path).unwrap();
        assert_eq!(loaded.warehouse.path, "local.duckdb");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = EtlConfig::load(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(loaded.staging.region, "us-west-2");
        assert!(!loaded.staging.has_sources());
    }

    #[test]
    fn test_validate_network_backend_requires_endpoint() {
        let config = EtlConfig::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_validate_redshift_staging() {
        let mut config = EtlConfig::parse(sample_config()).unwrap();
        assert!(config.validate().is_ok());

        config.staging.iam_role_arn = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duckdb() {
        assert!(EtlConfig::duckdb(":memory:").validate().is_ok());
        assert!(EtlConfig::duckdb("").validate().is_err());
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = Path::new("/etc/sparkify/dwh.toml");
        assert_eq!(EtlConfig::resolve_path(Some(explicit)), explicit.to_path_buf());
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("redshift".parse::<BackendType>().unwrap(), BackendType::Redshift);
        assert_eq!("PostgreSQL".parse::<BackendType>().unwrap(), BackendType::Postgres);
        assert_eq!("duckdb".parse::<BackendType>().unwrap(), BackendType::DuckDb);
        assert!("invalid".parse::<BackendType>().is_err());
        assert_eq!(BackendType::DuckDb.to_string(), "duckdb");
    }

    #[test]
    fn test_sample_config_is_valid() {
        let result = EtlConfig::parse(sample_config());
        assert!(result.is_ok(), "Sample config should be valid TOML");
    }
}
