//! Time-to-live memoization of loaded tables

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::{DatasetLoader, SourceId};
use crate::error::CoreError;
use crate::models::RawTable;

/// Wraps a loader and reuses its tables until they expire
///
/// Failed fetches are not cached.
#[derive(Debug, Clone)]
pub struct CachedLoader<L> {
    inner: L,
    tables: Cache<SourceId, Arc<RawTable>>,
}

impl<L: DatasetLoader> CachedLoader<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        let tables = Cache::builder()
            .max_capacity(16)
            .time_to_live(ttl)
            .build();

        Self { inner, tables }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Drop every cached table
    pub fn invalidate_all(&self) {
        self.tables.invalidate_all();
    }
}

impl<L: DatasetLoader> DatasetLoader for CachedLoader<L> {
    async fn fetch(&self, id: &SourceId) -> Result<Arc<RawTable>, CoreError> {
        if let Some(table) = self.tables.get(id).await {
            tracing::debug!(source = %id, "Dataset cache hit");
            return Ok(table);
        }

        let table = self.inner.fetch(id).await?;
        self.tables.insert(*id, Arc::clone(&table)).await;
        tracing::debug!(source = %id, rows = table.len(), "Dataset cached");
        Ok(table)
    }
}
