//! Shared helpers for identity verification integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use freightline_core::identity::{
    DEFAULT_KEY_SET_TTL, HttpKeySetFetcher, KeySetCache, ManualClock, MokaKeyStore,
    TransportSecurity, build_http_client,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fixed "now" for tests that drive an injected clock.
pub const NOW: i64 = 1_700_000_000;

pub const PRIMARY_KID: &str = "primary-2026";
pub const ROTATED_KID: &str = "rotated-2026";

pub const PRIMARY_PEM: &str = include_str!("../fixtures/primary_rsa.pem");
pub const ROTATED_PEM: &str = include_str!("../fixtures/rotated_rsa.pem");
pub const JWKS_PRIMARY: &str = include_str!("../fixtures/jwks_primary.json");
pub const JWKS_ROTATED: &str = include_str!("../fixtures/jwks_rotated.json");

pub const KEYS_PATH: &str = "/auth/keys";

/// Signs `claims` as an RS256 token carrying `kid`.
pub fn sign(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key should parse");
    jsonwebtoken::encode(&header, claims, &key).expect("signing should succeed")
}

/// Serves `jwks` at [`KEYS_PATH`], expecting exactly `times` requests.
pub async fn mount_jwks(server: &MockServer, jwks: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(KEYS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(jwks.to_owned(), "application/json"),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// JWKS endpoint URL on the mock server.
pub fn keys_url(server: &MockServer) -> String {
    format!("{}{KEYS_PATH}", server.uri())
}

/// Key cache over a real HTTP fetcher and the given clock.
pub fn key_cache(clock: Arc<ManualClock>) -> Arc<KeySetCache> {
    let http = build_http_client(Duration::from_secs(5), TransportSecurity::Verified)
        .expect("http client should build");
    Arc::new(KeySetCache::new(
        Arc::new(MokaKeyStore::new()),
        Arc::new(HttpKeySetFetcher::new(http)),
        clock,
        DEFAULT_KEY_SET_TTL,
    ))
}
