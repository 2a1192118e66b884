//! Verified identity token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a verified identity token.
///
/// Wraps the decoded payload unchanged, so provider-specific fields
/// (`email_verified`, `nonce`, `is_private_email`, ...) stay reachable
/// through [`VerifiedClaims::get`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    /// Wraps a decoded payload.
    #[must_use]
    pub const fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Returns a claim by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.string_claim("iss")
    }

    /// `sub` claim: the provider's stable user identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// `email` claim.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.string_claim("email")
    }

    /// `aud` claim, which may be a single string or an array.
    #[must_use]
    pub fn audiences(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// `exp` claim as a Unix timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.timestamp_claim("exp")
    }

    /// `nbf` claim as a Unix timestamp.
    #[must_use]
    pub fn not_before(&self) -> Option<i64> {
        self.timestamp_claim("nbf")
    }

    /// `iat` claim as a Unix timestamp.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.timestamp_claim("iat")
    }

    /// `exp` claim as a UTC datetime.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Borrows the underlying payload.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the claims, returning the payload.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    // Numeric dates may be encoded as floats by some issuers.
    #[allow(clippy::cast_possible_truncation)]
    fn timestamp_claim(&self, name: &str) -> Option<i64> {
        let value = self.0.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|secs| secs.trunc() as i64))
    }
}

impl From<Map<String, Value>> for VerifiedClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}
