//! Signing key set retrieval.

use async_trait::async_trait;
use tracing::{error, info};

use super::error::VerificationError;
use super::keyset::SigningKeySet;

/// Retrieves a provider's published signing keys.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetches and parses the JWKS document at `keys_url`.
    async fn fetch(&self, keys_url: &str) -> Result<SigningKeySet, VerificationError>;
}

/// Fetches JWKS documents over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Creates a fetcher on top of a configured HTTP client.
    #[must_use]
    pub const fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, keys_url: &str) -> Result<SigningKeySet, VerificationError> {
        info!(keys_url = %keys_url, "Fetching signing key set");

        let response = self
            .http_client
            .get(keys_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(keys_url = %keys_url, error = %e, "Failed to fetch signing key set");
                VerificationError::key_set_fetch(keys_url, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(keys_url = %keys_url, status = %status, "Key set endpoint returned error status");
            return Err(VerificationError::key_set_fetch(
                keys_url,
                format!("endpoint returned status {status}"),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(keys_url = %keys_url, error = %e, "Failed to read key set response");
            VerificationError::key_set_fetch(keys_url, e.to_string())
        })?;

        let key_set = SigningKeySet::from_jwks_json(&body).map_err(|e| {
            error!(keys_url = %keys_url, error = %e, "Failed to parse key set JSON");
            VerificationError::key_set_fetch(keys_url, format!("invalid JWKS document: {e}"))
        })?;

        info!(keys_url = %keys_url, key_count = key_set.len(), "Fetched signing key set");

        Ok(key_set)
    }
}
