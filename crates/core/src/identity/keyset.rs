//! Provider signing key sets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Raw JWKS document; keys are parsed one by one so a single unusable
/// entry does not invalidate the whole set.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

/// Public signing keys published by one provider, indexed by `kid`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigningKeySet {
    keys: HashMap<String, Jwk>,
}

impl SigningKeySet {
    /// Builds a key set from JWKs; keys without a `kid` are dropped.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = Jwk>) -> Self {
        let keys = keys
            .into_iter()
            .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
            .collect();
        Self { keys }
    }

    /// Parses a JWKS JSON document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is not an object with a
    /// `keys` array. Individual keys that fail to parse are skipped.
    pub fn from_jwks_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let document: JwksDocument = serde_json::from_slice(body)?;

        let mut keys = HashMap::with_capacity(document.keys.len());
        for raw in document.keys {
            let kid = raw.get("kid").and_then(Value::as_str).map(str::to_owned);
            match (kid, serde_json::from_value::<Jwk>(raw)) {
                (Some(kid), Ok(jwk)) => {
                    keys.insert(kid, jwk);
                }
                (None, _) => warn!("Skipping signing key without kid"),
                (Some(kid), Err(e)) => warn!(kid = %kid, error = %e, "Skipping unusable signing key"),
            }
        }

        Ok(Self { keys })
    }

    /// Looks up a key by identifier.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when no usable key was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key identifiers, in no particular order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// A key set together with the moment it was fetched.
#[derive(Debug, Clone)]
pub struct CachedKeySet {
    /// The keys.
    pub key_set: Arc<SigningKeySet>,
    /// When the keys were fetched.
    pub fetched_at: DateTime<Utc>,
    /// How long the keys are trusted after `fetched_at`.
    pub ttl: Duration,
}

impl CachedKeySet {
    /// Wraps a freshly fetched key set.
    #[must_use]
    pub fn new(key_set: SigningKeySet, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key_set: Arc::new(key_set),
            fetched_at,
            ttl,
        }
    }

    /// Returns true while `now` is inside the trust window.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age < self.ttl,
            // Clock went backwards, invalidate
            Err(_) => false,
        }
    }
}
