//! Google Sign-In ID token verification.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use freightline_shared::GoogleConfig;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::apple::DEFAULT_LEEWAY_SECS;
use super::cache::KeySetCache;
use super::claims::VerifiedClaims;
use super::error::VerificationError;
use super::token::IdentityToken;

/// Google's published signing certificates (JWKS form).
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Both spellings Google uses for `iss`.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Provider-side verification of Google ID tokens.
///
/// `Ok(None)` is a falsy verification: the provider looked at the token and
/// did not accept it without raising an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GoogleIdTokenClient: Send + Sync {
    /// Verifies signature, issuer, audience == `client_id`, and expiry.
    async fn verify_id_token(
        &self,
        id_token: &str,
        client_id: &str,
    ) -> Result<Option<VerifiedClaims>, VerificationError>;
}

/// Verifies Google ID tokens against Google's published certificates.
#[derive(Debug, Clone)]
pub struct GoogleCertsClient {
    key_cache: Arc<KeySetCache>,
    certs_url: String,
    leeway_secs: u64,
}

impl GoogleCertsClient {
    /// Creates a client against Google's production endpoint.
    #[must_use]
    pub fn new(key_cache: Arc<KeySetCache>) -> Self {
        Self {
            key_cache,
            certs_url: GOOGLE_CERTS_URL.to_string(),
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Creates a client from configuration.
    #[must_use]
    pub fn from_config(config: &GoogleConfig, key_cache: Arc<KeySetCache>) -> Self {
        Self {
            key_cache,
            certs_url: config.certs_url.clone(),
            leeway_secs: config.leeway_secs,
        }
    }

    /// Set the certificates endpoint.
    #[must_use]
    pub fn with_certs_url(mut self, certs_url: impl Into<String>) -> Self {
        self.certs_url = certs_url.into();
        self
    }
}

#[async_trait]
impl GoogleIdTokenClient for GoogleCertsClient {
    async fn verify_id_token(
        &self,
        id_token: &str,
        client_id: &str,
    ) -> Result<Option<VerifiedClaims>, VerificationError> {
        let token = IdentityToken::parse(id_token)?;
        let kid = token.key_id()?;

        let key_set = self.key_cache.get_current_key_set(&self.certs_url).await?;
        let Some(jwk) = key_set.find(kid) else {
            debug!(kid = %kid, "Google ID token names an unknown key ID");
            return Ok(None);
        };

        let key = DecodingKey::from_jwk(jwk).map_err(|e| VerificationError::TokenValidation {
            violations: vec![format!("unusable signing key {kid}: {e}")],
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = self.leeway_secs;

        let data = jsonwebtoken::decode::<Map<String, Value>>(token.as_str(), &key, &validation)
            .map_err(|e| VerificationError::TokenValidation {
                violations: vec![e.to_string()],
            })?;

        Ok(Some(VerifiedClaims::new(data.claims)))
    }
}

/// Verifies Google ID tokens for a caller-supplied OAuth client ID.
#[derive(Clone)]
pub struct GoogleTokenVerifier {
    client: Arc<dyn GoogleIdTokenClient>,
}

impl fmt::Debug for GoogleTokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleTokenVerifier")
            .field("client", &"[dyn GoogleIdTokenClient]")
            .finish()
    }
}

impl GoogleTokenVerifier {
    /// Creates a verifier over a provider client.
    #[must_use]
    pub fn new(client: Arc<dyn GoogleIdTokenClient>) -> Self {
        Self { client }
    }

    /// Verifies `id_token` for `expected_client_id`.
    ///
    /// Returns the token's claims, or `None` on any failure. Failures are
    /// logged here and never reach the caller, which should deny
    /// authentication on `None`. Use [`Self::verify_checked`] to see why.
    pub async fn verify(&self, id_token: &str, expected_client_id: &str) -> Option<VerifiedClaims> {
        match self.verify_checked(id_token, expected_client_id).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                error!(
                    client_id = %expected_client_id,
                    code = e.error_code(),
                    error = %e,
                    "Google ID token verification failed"
                );
                None
            }
        }
    }

    /// Verifies `id_token` for `expected_client_id`, returning the reason on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the provider client's error, or `VerificationError::Rejected`
    /// when the provider does not accept the token.
    pub async fn verify_checked(
        &self,
        id_token: &str,
        expected_client_id: &str,
    ) -> Result<VerifiedClaims, VerificationError> {
        match self
            .client
            .verify_id_token(id_token, expected_client_id)
            .await?
        {
            Some(claims) => {
                debug!(
                    client_id = %expected_client_id,
                    subject = ?claims.subject(),
                    "Google ID token verified"
                );
                Ok(claims)
            }
            None => Err(VerificationError::Rejected),
        }
    }

    /// Binds this verifier to one OAuth client ID.
    #[must_use]
    pub fn scoped(self: &Arc<Self>, client_id: impl Into<String>) -> GoogleClientVerifier {
        GoogleClientVerifier {
            verifier: Arc::clone(self),
            client_id: client_id.into(),
        }
    }
}

/// A [`GoogleTokenVerifier`] bound to one OAuth client ID.
#[derive(Debug, Clone)]
pub struct GoogleClientVerifier {
    verifier: Arc<GoogleTokenVerifier>,
    client_id: String,
}

impl GoogleClientVerifier {
    /// The OAuth client ID tokens must be issued for.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verifies `id_token` for the bound client ID.
    ///
    /// # Errors
    ///
    /// See [`GoogleTokenVerifier::verify_checked`].
    pub async fn verify(&self, id_token: &str) -> Result<VerifiedClaims, VerificationError> {
        self.verifier.verify_checked(id_token, &self.client_id).await
    }
}
