//! Command-line surface for the ETL binary

pub mod commands;
pub mod error;
