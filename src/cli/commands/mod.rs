//! CLI command implementations

pub mod etl;
