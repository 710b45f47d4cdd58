//! HTTP fetcher for configured key sources.

use crate::material::{parse_jwks, parse_pem};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use gatesync_types::{KeyFetcher, KeySourceType, PublicKeyInfo, PublicKeySource, SyncError,
    error::Result};
use secrecy::ExposeSecret as _;
use std::time::Duration;

/// Fetches key material over HTTP and parses it per the source's type.
pub struct HttpKeyFetcher {
    http: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Creates a fetcher with a per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_keys(&self, source: &PublicKeySource) -> Result<Vec<PublicKeyInfo>> {
        let mut request = self.http.get(&source.url);

        // "bearer" sends the credential as-is; "basic" expects "user:pass"
        // and encodes it. An unknown auth type fails the fetch rather than
        // silently going anonymous.
        if let Some(auth_type) = source.auth_type.as_deref() {
            let Some(credentials) = source.credentials.as_ref() else {
                return Err(SyncError::Config(format!(
                    "key source '{}' sets auth_type but no credentials",
                    source.id
                )));
            };
            request = match auth_type {
                "bearer" => request.header(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", credentials.expose_secret()),
                ),
                "basic" => request.header(
                    reqwest::header::AUTHORIZATION,
                    format!("Basic {}", STANDARD.encode(credentials.expose_secret())),
                ),
                other => {
                    return Err(SyncError::Config(format!(
                        "key source '{}' has unsupported auth_type '{other}'",
                        source.id
                    )));
                }
            };
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().await?;

        match source.source_type {
            KeySourceType::Pem => parse_pem(source, &body),
            KeySourceType::Jwks => parse_jwks(source, &body),
        }
    }
}
