//! Error types for brickboard-core
//!
//! One thiserror hierarchy shared by the loader, schema validation and the
//! analytics pipeline. Every pipeline stage fails eagerly at its own boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{Cohort, DatasetKind};

/// Core error type for brickboard operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Pipeline Errors
    // ===================
    #[error("No {dataset} rows left after filtering on {filter}")]
    EmptyInput { dataset: DatasetKind, filter: String },

    #[error("Missing required column '{column}' in {dataset} table")]
    MissingColumn { dataset: DatasetKind, column: String },

    #[error("No sales rows for business unit {business_unit} and product {product_name}")]
    NoOverlap {
        business_unit: String,
        product_name: String,
    },

    #[error("Rolling window must cover at least 1 month (got {window})")]
    InvalidWindow { window: usize },

    #[error("{cohort} cohort has {points} history point(s), at least 2 are needed to fit a trend")]
    InsufficientHistory { cohort: Cohort, points: usize },

    // ===================
    // Schema Errors
    // ===================
    #[error("Invalid value '{value}' for column '{column}' at {dataset} row {row}: {reason}")]
    InvalidValue {
        dataset: DatasetKind,
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // ===================
    // Loader Errors
    // ===================
    #[error("Dataset file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {source_name}")]
    CsvParse {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl CoreError {
    /// Actionable hint for the user, when one exists
    pub fn suggestion(&self) -> Option<String> {
        match self {
            CoreError::EmptyInput { .. } => {
                Some("Check --sales-line: the suggestions file may use another business unit".into())
            }
            CoreError::MissingColumn { dataset, .. } => Some(format!(
                "Inspect the header row of the {} file: head -1 <file>",
                dataset
            )),
            CoreError::NoOverlap { .. } => {
                Some("Check --brand and --sales-line against the sales file contents".into())
            }
            CoreError::InvalidWindow { .. } => Some("Use --window between 1 and 12".into()),
            CoreError::InsufficientHistory { .. } => {
                Some("Move --rec-date later or shrink --window to keep more history".into())
            }
            CoreError::FileNotFound { path } => Some(format!(
                "Check if file exists: ls {}",
                path.display()
            )),
            CoreError::FileRead { path, .. } => Some(format!(
                "Check permissions: chmod +r {}",
                path.display()
            )),
            CoreError::ConfigParse { path, .. } => Some(format!(
                "Validate TOML syntax in {} (dates must be quoted strings)",
                path.display()
            )),
            _ => None,
        }
    }
}
