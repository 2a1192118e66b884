//! Unverified parsing of compact identity tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::claims::VerifiedClaims;
use super::error::VerificationError;

/// JOSE header fields the verifiers look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm.
    #[serde(default)]
    pub alg: Option<String>,
    /// Key identifier.
    #[serde(default)]
    pub kid: Option<String>,
    /// Token type.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Outcome of checking a token's signature against one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature verifies.
    Valid,
    /// Signature does not verify under the key.
    Mismatch,
    /// Algorithm or key material cannot be used for this token.
    SignerMismatch,
}

/// An identity token split into its parts, signature not yet checked.
#[derive(Debug, Clone)]
pub struct IdentityToken {
    raw: String,
    header: TokenHeader,
    claims: VerifiedClaims,
}

impl IdentityToken {
    /// Parses a compact token without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::MalformedToken` unless the token is exactly
    /// three base64url segments whose header and payload are JSON objects.
    pub fn parse(token: &str) -> Result<Self, VerificationError> {
        let token = token.trim();
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(VerificationError::malformed(
                "expected three dot-separated segments",
            ));
        };

        let header_json = decode_segment(header, "header")?;
        let payload_json = decode_segment(payload, "payload")?;
        if signature.is_empty() {
            return Err(VerificationError::malformed("signature segment is empty"));
        }
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| VerificationError::malformed(format!("signature is not base64url: {e}")))?;

        let header: TokenHeader = serde_json::from_slice(&header_json).map_err(|e| {
            VerificationError::malformed(format!("header is not a JSON object: {e}"))
        })?;
        let claims: Map<String, Value> = serde_json::from_slice(&payload_json).map_err(|e| {
            VerificationError::malformed(format!("payload is not a JSON object: {e}"))
        })?;

        Ok(Self {
            raw: token.to_string(),
            header,
            claims: VerifiedClaims::new(claims),
        })
    }

    /// The compact token as received, surrounding whitespace removed.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed header.
    #[must_use]
    pub const fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Payload claims. Not trustworthy until the signature has been checked.
    #[must_use]
    pub const fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    /// Key identifier from the header.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::MissingKeyId` when the header has none.
    pub fn key_id(&self) -> Result<&str, VerificationError> {
        match self.header.kid.as_deref() {
            Some(kid) if !kid.is_empty() => Ok(kid),
            _ => Err(VerificationError::MissingKeyId),
        }
    }

    /// Consumes the token, returning its claims.
    #[must_use]
    pub fn into_claims(self) -> VerifiedClaims {
        self.claims
    }

    /// Checks the signature over `header.payload` with RS256 only.
    ///
    /// Claims are not validated here; callers check issuer and time window
    /// themselves so every violation can be reported together.
    #[must_use]
    pub fn check_rs256_signature(&self, jwk: &Jwk) -> SignatureCheck {
        if self.header.alg.as_deref() != Some("RS256") {
            return SignatureCheck::SignerMismatch;
        }
        let Ok(key) = DecodingKey::from_jwk(jwk) else {
            return SignatureCheck::SignerMismatch;
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        match jsonwebtoken::decode::<Map<String, Value>>(&self.raw, &key, &validation) {
            Ok(_) => SignatureCheck::Valid,
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm
                | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat => {
                    SignatureCheck::SignerMismatch
                }
                _ => SignatureCheck::Mismatch,
            },
        }
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, VerificationError> {
    if segment.is_empty() {
        return Err(VerificationError::malformed(format!("{name} segment is empty")));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerificationError::malformed(format!("{name} is not base64url: {e}")))
}
