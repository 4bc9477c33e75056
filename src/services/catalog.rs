use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cache::ProductCache;
use crate::config::CatalogConfig;
use crate::errors::ServiceError;

/// Catalog view of a product: enough to price and stock-check a cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    /// Units available to sell
    pub stock: u32,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog request timed out")]
    Timeout,
    #[error("catalog returned status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Transport(err.to_string())
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Timeout => ServiceError::UpstreamTimeout(err.to_string()),
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// Product catalog collaborator
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// `Ok(None)` when the catalog does not know the product
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductInfo>, CatalogError>;
}

/// REST catalog client: `GET {base}/products/{id}`
#[derive(Clone)]
pub struct HttpProductCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductCatalog {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `None` when no catalog URL is configured
    pub fn from_config(config: &CatalogConfig) -> Result<Option<Self>, CatalogError> {
        config
            .base_url
            .as_ref()
            .map(|url| Self::new(url.clone(), Duration::from_secs(config.timeout_secs)))
            .transpose()
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[instrument(skip(self))]
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductInfo>, CatalogError> {
        let response = self
            .client
            .get(format!("{}/products/{}", self.base_url, product_id))
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<ProductInfo>().await?)),
            status => Err(CatalogError::Status(status.as_u16())),
        }
    }
}

/// Catalog held in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<String, ProductInfo>>,
}

impl InMemoryCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductInfo>) -> Self {
        Self {
            products: RwLock::new(products.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub fn set_stock(&self, product_id: &str, stock: u32) {
        let mut products = self.products.write().unwrap_or_else(|p| p.into_inner());
        if let Some(product) = products.get_mut(product_id) {
            product.stock = stock;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductInfo>, CatalogError> {
        let products = self.products.read().unwrap_or_else(|p| p.into_inner());
        Ok(products.get(product_id).cloned())
    }
}

/// Read-through wrapper that consults a [`ProductCache`] first.
/// Unknown products are not cached.
pub struct CachedCatalog {
    inner: Arc<dyn ProductCatalog>,
    cache: Arc<ProductCache>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn ProductCatalog>, cache: Arc<ProductCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ProductCatalog for CachedCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductInfo>, CatalogError> {
        if let Some(hit) = self.cache.get(product_id) {
            debug!(product_id, "Product cache hit");
            return Ok(Some(hit));
        }
        let fetched = self.inner.fetch_product(product_id).await?;
        if let Some(product) = &fetched {
            self.cache.insert(product.clone());
        }
        Ok(fetched)
    }
}

/// Configured HTTP catalog behind a system-clock [`ProductCache`].
/// `None` when no catalog URL is configured.
pub fn catalog_from_config(
    config: &CatalogConfig,
) -> Result<Option<Arc<dyn ProductCatalog>>, CatalogError> {
    let Some(http) = HttpProductCatalog::from_config(config)? else {
        return Ok(None);
    };
    let cache = Arc::new(ProductCache::with_system_clock(Duration::from_secs(
        config.cache_ttl_secs,
    )));
    Ok(Some(Arc::new(CachedCatalog::new(Arc::new(http), cache))))
}
