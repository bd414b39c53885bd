//! brickboard-core - Core library for brickboard
//!
//! Classifies bricks by suggestion usage, aggregates sales per usage cohort
//! and projects the divergence between high and low usage cohorts.

pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod models;

pub use analytics::{DashboardReport, ProjectionOutcome};
pub use config::{Brand, ConfigLayer, DashboardConfig, Level, Quantiles, SalesLine, SourceConfig};
pub use error::CoreError;
pub use export::export_report_to_csv;
pub use loader::{load_datasets, CachedLoader, DataSource, DatasetLoader, FileLoader, HttpLoader, SourceId};
pub use models::{RawTable, SalesRecord, UsageRecord};
