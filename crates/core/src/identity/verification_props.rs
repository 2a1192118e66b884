//! Property-based tests for identity token verification.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use proptest::prelude::*;
use serde_json::json;

use super::apple::{APPLE_ISSUER, AppleTokenVerifier};
use super::cache::{DEFAULT_KEY_SET_TTL, KeySetCache, MokaKeyStore};
use super::clock::ManualClock;
use super::constraints::ISSUER_MISMATCH;
use super::error::VerificationError;
use super::fetcher::KeySetFetcher;
use super::keyset::SigningKeySet;
use super::token::IdentityToken;

const NOW: i64 = 1_700_000_000;
const KNOWN_KID: &str = "primary-2026";
const PRIMARY_JWKS: &str = include_str!("../../tests/fixtures/jwks_primary.json");
const PRIMARY_PEM: &str = include_str!("../../tests/fixtures/primary_rsa.pem");

/// Serves the fixture key set without touching the network.
struct StaticFetcher;

#[async_trait]
impl KeySetFetcher for StaticFetcher {
    async fn fetch(&self, keys_url: &str) -> Result<SigningKeySet, VerificationError> {
        SigningKeySet::from_jwks_json(PRIMARY_JWKS.as_bytes())
            .map_err(|e| VerificationError::key_set_fetch(keys_url, e.to_string()))
    }
}

fn verifier() -> AppleTokenVerifier {
    let cache = KeySetCache::new(
        Arc::new(MokaKeyStore::new()),
        Arc::new(StaticFetcher),
        Arc::new(ManualClock::at_unix(NOW)),
        DEFAULT_KEY_SET_TTL,
    );
    AppleTokenVerifier::new(Arc::new(cache))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn b64(value: &serde_json::Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

/// Strategy for key IDs that are not in the fixture key set.
fn unknown_kid() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,24}".prop_filter("must not be the known kid", |kid| kid != KNOWN_KID)
}

/// Strategy for issuers other than Apple's.
fn foreign_issuer() -> impl Strategy<Value = String> {
    "https://[a-z]{3,12}\\.[a-z]{2,4}".prop_filter("must not be Apple", |iss| iss != APPLE_ISSUER)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A token naming a key outside the current key set is never accepted,
    /// whatever its payload or signature bytes.
    #[test]
    fn prop_unknown_kid_is_rejected(
        kid in unknown_kid(),
        subject in "[0-9]{6,20}",
        signature in prop::collection::vec(any::<u8>(), 1..300),
    ) {
        let token = format!(
            "{}.{}.{}",
            b64(&json!({"alg": "RS256", "kid": kid})),
            b64(&json!({"iss": APPLE_ISSUER, "sub": subject, "exp": NOW + 600})),
            URL_SAFE_NO_PAD.encode(&signature),
        );

        let err = block_on(verifier().verify(&token)).unwrap_err();
        prop_assert_eq!(err, VerificationError::UnknownKey { kid });
    }

    /// Parsing arbitrary input either succeeds or reports a malformed token.
    #[test]
    fn prop_parse_never_panics(input in ".{0,200}") {
        match IdentityToken::parse(&input) {
            Ok(_) | Err(VerificationError::MalformedToken(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A correctly signed, unexpired token from a foreign issuer fails with
    /// exactly the issuer violation.
    #[test]
    fn prop_foreign_issuer_is_rejected(issuer in foreign_issuer()) {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KNOWN_KID.to_string());
        let key = EncodingKey::from_rsa_pem(PRIMARY_PEM.as_bytes()).unwrap();
        let claims = json!({"iss": issuer, "sub": "001234.abc", "iat": NOW, "exp": NOW + 600});
        let token = jsonwebtoken::encode(&header, &claims, &key).unwrap();

        let err = block_on(verifier().verify(&token)).unwrap_err();
        prop_assert_eq!(
            err,
            VerificationError::TokenValidation { violations: vec![ISSUER_MISMATCH.to_string()] }
        );
    }
}
