//! Local directory loader

use std::path::PathBuf;
use std::sync::Arc;

use super::{DatasetLoader, SourceId};
use crate::error::CoreError;
use crate::models::RawTable;

/// Reads `{root}/{brand}_{dataset}.csv`
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, id: &SourceId) -> PathBuf {
        self.root.join(id.file_name())
    }
}

impl DatasetLoader for FileLoader {
    async fn fetch(&self, id: &SourceId) -> Result<Arc<RawTable>, CoreError> {
        let path = self.path_for(id);

        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound { path: path.clone() }
            } else {
                CoreError::FileRead {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Read dataset file");

        let table = RawTable::from_csv(id.kind, &path.display().to_string(), bytes.as_slice())?;
        Ok(Arc::new(table))
    }
}
