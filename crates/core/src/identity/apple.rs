//! Sign in with Apple identity token verification.

use std::sync::Arc;

use freightline_shared::AppleConfig;
use jsonwebtoken::jwk::Jwk;
use tracing::debug;

use super::cache::KeySetCache;
use super::claims::VerifiedClaims;
use super::constraints::{issuer_violation, signature_violation, time_window_violations};
use super::error::VerificationError;
use super::token::IdentityToken;

/// Issuer of every Apple identity token.
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Apple's published signing keys.
pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";

/// Default clock skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Verifies identity tokens issued by Sign in with Apple.
///
/// Stateless apart from the shared key cache; safe to call concurrently.
#[derive(Debug, Clone)]
pub struct AppleTokenVerifier {
    key_cache: Arc<KeySetCache>,
    keys_url: String,
    issuer: String,
    leeway_secs: u64,
    refresh_on_unknown_key: bool,
}

impl AppleTokenVerifier {
    /// Creates a verifier against Apple's production endpoint.
    #[must_use]
    pub fn new(key_cache: Arc<KeySetCache>) -> Self {
        Self {
            key_cache,
            keys_url: APPLE_KEYS_URL.to_string(),
            issuer: APPLE_ISSUER.to_string(),
            leeway_secs: DEFAULT_LEEWAY_SECS,
            refresh_on_unknown_key: false,
        }
    }

    /// Creates a verifier from configuration.
    #[must_use]
    pub fn from_config(config: &AppleConfig, key_cache: Arc<KeySetCache>) -> Self {
        Self {
            key_cache,
            keys_url: config.keys_url.clone(),
            issuer: config.issuer.clone(),
            leeway_secs: config.leeway_secs,
            refresh_on_unknown_key: config.refresh_on_unknown_key,
        }
    }

    /// Set the JWKS endpoint.
    #[must_use]
    pub fn with_keys_url(mut self, keys_url: impl Into<String>) -> Self {
        self.keys_url = keys_url.into();
        self
    }

    /// Set clock skew tolerance in seconds.
    #[must_use]
    pub const fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Refresh the key set once when a token names an unknown key.
    #[must_use]
    pub const fn with_refresh_on_unknown_key(mut self, enabled: bool) -> Self {
        self.refresh_on_unknown_key = enabled;
        self
    }

    /// JWKS endpoint in use.
    #[must_use]
    pub fn keys_url(&self) -> &str {
        &self.keys_url
    }

    /// Verifies an Apple identity token.
    ///
    /// Signature, issuer and validity window are all checked before failing,
    /// so a `TokenValidation` error lists every violated constraint.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the token cannot be parsed
    /// - `MissingKeyId` if the header has no `kid`
    /// - `KeySetFetch` if Apple's keys cannot be retrieved
    /// - `UnknownKey` if `kid` is not in Apple's current key set
    /// - `TokenValidation` if any constraint fails
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        let token = IdentityToken::parse(token)?;
        let kid = token.key_id()?;

        let jwk = self.find_key(kid).await?;

        let mut violations: Vec<String> = Vec::new();
        if let Some(violation) = signature_violation(token.check_rs256_signature(&jwk)) {
            violations.push(violation.to_string());
        }
        if let Some(violation) = issuer_violation(token.claims(), &[self.issuer.as_str()]) {
            violations.push(violation.to_string());
        }
        let now = self.key_cache.clock().now();
        violations.extend(
            time_window_violations(token.claims(), now, self.leeway_secs)
                .into_iter()
                .map(str::to_string),
        );

        if !violations.is_empty() {
            debug!(kid = %kid, violations = ?violations, "Apple identity token rejected");
            return Err(VerificationError::TokenValidation { violations });
        }

        debug!(kid = %kid, subject = ?token.claims().subject(), "Apple identity token verified");
        Ok(token.into_claims())
    }

    async fn find_key(&self, kid: &str) -> Result<Jwk, VerificationError> {
        let key_set = self.key_cache.get_current_key_set(&self.keys_url).await?;
        if let Some(jwk) = key_set.find(kid) {
            return Ok(jwk.clone());
        }

        if self.refresh_on_unknown_key {
            debug!(kid = %kid, "Unknown Apple key ID, refreshing key set");
            let key_set = self.key_cache.refresh(&self.keys_url).await?;
            if let Some(jwk) = key_set.find(kid) {
                return Ok(jwk.clone());
            }
        }

        debug!(kid = %kid, "Apple identity token names an unknown key ID");
        Err(VerificationError::UnknownKey {
            kid: kid.to_string(),
        })
    }
}
