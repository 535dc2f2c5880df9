use async_trait::async_trait;
use serde_json::Value;

use super::http::HttpClient;
use crate::errors::HttpError;

const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

/// Free-text profile search, used to turn a username into a wallet.
#[async_trait]
pub trait ProfileSearch: Send + Sync {
    /// Raw search response. Shape varies; see
    /// [`crate::services::resolver::extract_address`].
    async fn search_profiles(&self, query: &str) -> Result<Value, HttpError>;
}

#[derive(Debug, Clone)]
pub struct GammaClient {
    http: HttpClient,
    base_url: String,
}

impl GammaClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: GAMMA_API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProfileSearch for GammaClient {
    async fn search_profiles(&self, query: &str) -> Result<Value, HttpError> {
        let url = format!("{}/public-search", self.base_url);
        // The endpoint takes `q`; `query` is silently ignored.
        self.http
            .get_json(&url, &[("q", query), ("search_profiles", "true")])
            .await
    }
}
