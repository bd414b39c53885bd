//! Dataset loading
//!
//! The pipeline never reads files itself; it receives typed records. A
//! [`DatasetLoader`] turns a [`SourceId`] into a [`RawTable`], and
//! [`load_datasets`] validates both tables into records.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::{Brand, SourceConfig};
use crate::error::CoreError;
use crate::models::{
    sales_records_from_table, usage_records_from_table, DatasetKind, RawTable, SalesRecord,
    UsageRecord,
};

pub mod cache;
pub mod file;
pub mod http;

pub use cache::CachedLoader;
pub use file::FileLoader;
pub use http::HttpLoader;

/// Identity of one source dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub brand: Brand,
    pub kind: DatasetKind,
}

impl SourceId {
    pub fn new(brand: Brand, kind: DatasetKind) -> Self {
        Self { brand, kind }
    }

    /// e.g. `trixeo_suggestions.csv`
    pub fn file_name(&self) -> String {
        format!("{}_{}.csv", self.brand.slug(), self.kind.slug())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.brand.slug(), self.kind.slug())
    }
}

/// Anything that can produce a raw table for a source identity
pub trait DatasetLoader: Send + Sync {
    fn fetch(&self, id: &SourceId) -> impl Future<Output = Result<Arc<RawTable>, CoreError>> + Send;
}

/// Loader selected from a location string
#[derive(Debug, Clone)]
pub enum DataSource {
    File(FileLoader),
    Http(HttpLoader),
}

impl DataSource {
    /// `http://` / `https://` locations are fetched, anything else is a directory
    pub fn from_location(location: &str) -> Result<Self, CoreError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Ok(DataSource::Http(HttpLoader::new(location)?))
        } else {
            Ok(DataSource::File(FileLoader::new(location)))
        }
    }

    /// Source selected by the config, memoized for its TTL
    pub fn cached(config: &SourceConfig) -> Result<CachedLoader<Self>, CoreError> {
        Ok(CachedLoader::new(Self::from_location(&config.location)?, config.cache_ttl))
    }
}

impl DatasetLoader for DataSource {
    async fn fetch(&self, id: &SourceId) -> Result<Arc<RawTable>, CoreError> {
        match self {
            DataSource::File(loader) => loader.fetch(id).await,
            DataSource::Http(loader) => loader.fetch(id).await,
        }
    }
}

/// Fetch both datasets of a brand concurrently and validate them into records
pub async fn load_datasets<L: DatasetLoader>(
    loader: &L,
    brand: Brand,
) -> Result<(Vec<UsageRecord>, Vec<SalesRecord>), CoreError> {
    let usage_id = SourceId::new(brand, DatasetKind::Suggestions);
    let sales_id = SourceId::new(brand, DatasetKind::Sales);

    let (usage, sales) = tokio::try_join!(loader.fetch(&usage_id), loader.fetch(&sales_id))?;

    let usage = usage_records_from_table(&usage)?;
    let sales = sales_records_from_table(&sales)?;

    tracing::info!(
        brand = %brand,
        usage_rows = usage.len(),
        sales_rows = sales.len(),
        "Loaded datasets"
    );

    Ok((usage, sales))
}
