//! Client side of the free model catalog.

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;

use super::types::ModelOption;
use crate::catalog::CatalogResponse;
use crate::http::{create_client_with_timeout, CATALOG_TIMEOUT};

#[derive(Debug)]
pub enum CatalogError {
    Request(reqwest::Error),
    Status(u16),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Request(e) => write!(f, "Catalog request failed: {}", e),
            CatalogError::Status(status) => write!(f, "Catalog returned HTTP {}", status),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Where the engine learns which free models exist.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<CatalogResponse, CatalogError>;
}

/// Fetches the catalog from a running gateway.
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    url: String,
}

impl HttpCatalog {
    /// `gateway_url` is the gateway root, e.g. `http://127.0.0.1:3000`.
    pub fn new(gateway_url: &str) -> Self {
        Self {
            client: create_client_with_timeout(CATALOG_TIMEOUT),
            url: format!("{}/api/v1/models", gateway_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch_catalog(&self) -> Result<CatalogResponse, CatalogError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CatalogError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        response.json().await.map_err(CatalogError::Request)
    }
}

/// Convert a catalog into selectable free models plus the default model id.
pub fn free_model_options(catalog: CatalogResponse) -> (Vec<ModelOption>, String) {
    let models = catalog
        .models
        .into_iter()
        .map(|entry| ModelOption {
            value: entry.id.clone(),
            id: entry.id,
            label: entry.label,
            is_built_in: true,
            no_api_required: Some(true),
        })
        .collect();

    (models, catalog.default_model)
}
