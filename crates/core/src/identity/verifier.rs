//! Provider-agnostic verification entry point.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use freightline_shared::AppConfig;
use tracing::{info, warn};

use super::apple::AppleTokenVerifier;
use super::cache::{KeySetCache, KeyValueStore, MokaKeyStore};
use super::claims::VerifiedClaims;
use super::clock::{Clock, SystemClock};
use super::error::VerificationError;
use super::fetcher::HttpKeySetFetcher;
use super::google::{GoogleCertsClient, GoogleClientVerifier, GoogleTokenVerifier};
use super::transport::{TransportSecurity, build_http_client};

/// Outcome of verifying one identity token.
pub type VerificationResult = Result<VerifiedClaims, VerificationError>;

/// Supported sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityProvider {
    /// Sign in with Apple.
    Apple,
    /// Google Sign-In.
    Google,
}

impl IdentityProvider {
    /// Returns the lowercase provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apple => "apple",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apple" => Ok(Self::Apple),
            "google" => Ok(Self::Google),
            other => Err(format!("unknown identity provider: {other}")),
        }
    }
}

/// Verifies tokens from one provider with a typed result.
///
/// Implementations never panic on bad input and log rejected tokens once.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// The provider this verifier accepts tokens from.
    fn provider(&self) -> IdentityProvider;

    /// Verifies `token` and returns its claims.
    async fn verify_identity(&self, token: &str) -> VerificationResult;
}

fn log_rejection(provider: IdentityProvider, result: &VerificationResult) {
    if let Err(e) = result {
        warn!(
            provider = %provider,
            code = e.error_code(),
            error = %e,
            "Identity token rejected"
        );
    }
}

#[async_trait]
impl IdentityVerifier for AppleTokenVerifier {
    fn provider(&self) -> IdentityProvider {
        IdentityProvider::Apple
    }

    async fn verify_identity(&self, token: &str) -> VerificationResult {
        let result = self.verify(token).await;
        log_rejection(self.provider(), &result);
        result
    }
}

#[async_trait]
impl IdentityVerifier for GoogleClientVerifier {
    fn provider(&self) -> IdentityProvider {
        IdentityProvider::Google
    }

    async fn verify_identity(&self, token: &str) -> VerificationResult {
        let result = self.verify(token).await;
        log_rejection(self.provider(), &result);
        result
    }
}

/// The configured verifiers for every supported provider.
#[derive(Debug, Clone)]
pub struct IdentityVerifiers {
    /// Sign in with Apple.
    pub apple: AppleTokenVerifier,
    /// Google Sign-In; bind a client ID with [`GoogleTokenVerifier::scoped`].
    pub google: Arc<GoogleTokenVerifier>,
    default_google_client_id: Option<String>,
}

impl IdentityVerifiers {
    /// Builds verifiers from configuration with in-process key storage and the
    /// wall clock.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::Transport` if an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, VerificationError> {
        Self::build(config, Arc::new(MokaKeyStore::new()), Arc::new(SystemClock))
    }

    /// Builds verifiers from configuration over the given store and clock.
    ///
    /// Apple requests always validate TLS certificates. Google requests may
    /// skip validation only under [`TransportSecurity::resolve`].
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::Transport` if an HTTP client cannot be built.
    pub fn build(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VerificationError> {
        let identity = &config.identity;
        let timeout = Duration::from_secs(identity.http_timeout_secs);

        let apple_http = build_http_client(timeout, TransportSecurity::Verified)?;
        let apple_cache = Arc::new(KeySetCache::new(
            Arc::clone(&store),
            Arc::new(HttpKeySetFetcher::new(apple_http)),
            Arc::clone(&clock),
            Duration::from_secs(identity.apple.key_cache_ttl_secs),
        ));

        let google_security =
            TransportSecurity::resolve(config.environment, identity.google.allow_insecure_tls);
        let google_http = build_http_client(timeout, google_security)?;
        let google_cache = Arc::new(KeySetCache::new(
            store,
            Arc::new(HttpKeySetFetcher::new(google_http)),
            clock,
            Duration::from_secs(identity.google.key_cache_ttl_secs),
        ));

        info!(
            environment = %config.environment,
            apple_keys_url = %identity.apple.keys_url,
            google_certs_url = %identity.google.certs_url,
            "Identity verifiers configured"
        );

        Ok(Self {
            apple: AppleTokenVerifier::from_config(&identity.apple, apple_cache),
            google: Arc::new(GoogleTokenVerifier::new(Arc::new(
                GoogleCertsClient::from_config(&identity.google, google_cache),
            ))),
            default_google_client_id: identity.google.client_id.clone(),
        })
    }

    /// Returns a Google verifier bound to `client_id`, falling back to the
    /// configured default client ID.
    #[must_use]
    pub fn google_for(&self, client_id: Option<&str>) -> Option<GoogleClientVerifier> {
        client_id
            .or(self.default_google_client_id.as_deref())
            .map(|id| self.google.scoped(id))
    }
}
