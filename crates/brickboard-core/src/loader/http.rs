//! HTTP(S) loader for remotely hosted datasets

use std::sync::Arc;

use super::{DatasetLoader, SourceId};
use crate::error::CoreError;
use crate::models::RawTable;

/// Fetches `{base_url}/{brand}_{dataset}.csv`
#[derive(Debug, Clone)]
pub struct HttpLoader {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("brickboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| CoreError::Fetch {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url_for(&self, id: &SourceId) -> String {
        format!("{}/{}", self.base_url, id.file_name())
    }
}

impl DatasetLoader for HttpLoader {
    async fn fetch(&self, id: &SourceId) -> Result<Arc<RawTable>, CoreError> {
        let url = self.url_for(id);
        tracing::info!("Fetching dataset from {}", url);

        let fetch_err = |source| CoreError::Fetch {
            url: url.clone(),
            source,
        };

        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_err)?
            .bytes()
            .await
            .map_err(fetch_err)?;

        let table = RawTable::from_csv(id.kind, &url, body.as_ref())?;
        Ok(Arc::new(table))
    }
}
