//! HTTP client for the external configuration registry.
//!
//! The registry is the service of record for route definitions, rate-limit
//! definitions, and client access configurations. This crate only fetches
//! and decodes; retry, caching, and snapshot publication are owned by the
//! refresh coordinator.

use async_trait::async_trait;
use gatesync_types::{
    ClientAccessDto, RateLimitDefinition, RegistrySource, RouteDefinition, SyncError,
    error::Result,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A [`RegistrySource`] backed by the registry's HTTP API.
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    /// Creates a client for the given base URL with a per-request timeout.
    ///
    /// A trailing slash on `base_url` is tolerated.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// GET `{base}/{path}` and decode a JSON list.
    async fn fetch_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let items = response.json::<Vec<T>>().await?;
        tracing::debug!(url = %url, count = items.len(), "registry fetch complete");
        Ok(items)
    }
}

#[async_trait]
impl RegistrySource for HttpRegistryClient {
    async fn fetch_access_configs(&self) -> Result<Vec<ClientAccessDto>> {
        self.fetch_list("access-configs").await
    }

    async fn fetch_routes(&self) -> Result<Vec<RouteDefinition>> {
        self.fetch_list("routes").await
    }

    async fn fetch_rate_limits(&self) -> Result<Vec<RateLimitDefinition>> {
        self.fetch_list("rate-limits").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpRegistryClient::new("http://registry:8500/", Duration::from_secs(5));
        assert_eq!(client.base_url, "http://registry:8500");
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_fetch_error() {
        // Nothing listens on this port; the connection error must map to a
        // retryable fetch error rather than a panic or an opaque failure.
        let client =
            HttpRegistryClient::new("http://127.0.0.1:1", Duration::from_millis(250));
        let err = client.fetch_access_configs().await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
        assert!(err.is_retryable());
    }
}
