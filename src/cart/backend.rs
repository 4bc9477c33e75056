use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use crate::entities::cart::CartLine;
use crate::errors::ServiceError;
use crate::services::carts::CartService;

#[derive(Debug, Error)]
pub enum CartBackendError {
    #[error("cart request failed: {0}")]
    Transport(String),
    #[error("cart request timed out")]
    Timeout,
    #[error("cart server returned status {0}")]
    Rejected(u16),
    #[error("cart storage failed: {0}")]
    Storage(String),
    #[error("invalid cart url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for CartBackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CartBackendError::Timeout
        } else {
            CartBackendError::Transport(err.to_string())
        }
    }
}

impl From<ServiceError> for CartBackendError {
    fn from(err: ServiceError) -> Self {
        CartBackendError::Storage(err.to_string())
    }
}

/// Where a signed-in user's cart lives
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Vec<CartLine>, CartBackendError>;
    async fn save(&self, user_id: &str, items: Vec<CartLine>) -> Result<(), CartBackendError>;
}

#[async_trait]
impl CartBackend for CartService {
    async fn load(&self, user_id: &str) -> Result<Vec<CartLine>, CartBackendError> {
        Ok(self.get_cart(user_id).await?)
    }

    async fn save(&self, user_id: &str, items: Vec<CartLine>) -> Result<(), CartBackendError> {
        self.save_cart(user_id, items).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CartEnvelope {
    #[serde(default)]
    items: Vec<CartLine>,
}

#[derive(Debug, Serialize)]
struct SaveCartBody<'a> {
    items: &'a [CartLine],
}

/// Talks to the cart endpoints at `{base}/carts/{user_id}`
#[derive(Clone)]
pub struct HttpCartBackend {
    client: reqwest::Client,
    base_url: reqwest::Url,
    auth_token: Option<String>,
}

impl HttpCartBackend {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CartBackendError> {
        let base_url = base_url.into();
        let base_url = reqwest::Url::parse(&base_url)
            .map_err(|e| CartBackendError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CartBackendError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// `{base}/carts/{user_id}` with the user id percent-encoded as one segment
    fn cart_url(&self, user_id: &str) -> Result<reqwest::Url, CartBackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CartBackendError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("carts")
            .push(user_id);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        user_id: &str,
    ) -> Result<reqwest::RequestBuilder, CartBackendError> {
        let builder = self.client.request(method, self.cart_url(user_id)?);
        Ok(match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }
}

#[async_trait]
impl CartBackend for HttpCartBackend {
    #[instrument(skip(self))]
    async fn load(&self, user_id: &str) -> Result<Vec<CartLine>, CartBackendError> {
        let response = self.request(reqwest::Method::GET, user_id)?.send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => Ok(response.json::<CartEnvelope>().await?.items),
            status => Err(CartBackendError::Rejected(status.as_u16())),
        }
    }

    #[instrument(skip(self, items), fields(line_count = items.len()))]
    async fn save(&self, user_id: &str, items: Vec<CartLine>) -> Result<(), CartBackendError> {
        let response = self
            .request(reqwest::Method::PUT, user_id)?
            .json(&SaveCartBody { items: &items })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CartBackendError::Rejected(response.status().as_u16()))
        }
    }
}
