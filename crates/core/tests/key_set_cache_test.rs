//! Key set cache behaviour against a mock JWKS endpoint.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{JWKS_PRIMARY, KEYS_PATH, NOW, PRIMARY_KID, key_cache, keys_url, mount_jwks};
use freightline_core::identity::{ManualClock, VerificationError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_key_set_fetched_once_within_ttl() {
    let server = MockServer::start().await;
    mount_jwks(&server, JWKS_PRIMARY, 1).await;
    let clock = Arc::new(ManualClock::at_unix(NOW));
    let cache = key_cache(Arc::clone(&clock));
    let url = keys_url(&server);

    let first = cache.get_current_key_set(&url).await.unwrap();
    clock.advance(Duration::seconds(299));
    let second = cache.get_current_key_set(&url).await.unwrap();

    assert!(first.find(PRIMARY_KID).is_some());
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_key_set_refetched_after_ttl() {
    let server = MockServer::start().await;
    mount_jwks(&server, JWKS_PRIMARY, 2).await;
    let clock = Arc::new(ManualClock::at_unix(NOW));
    let cache = key_cache(Arc::clone(&clock));
    let url = keys_url(&server);

    cache.get_current_key_set(&url).await.unwrap();
    clock.advance(Duration::seconds(301));
    cache.get_current_key_set(&url).await.unwrap();
    cache.get_current_key_set(&url).await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEYS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_jwks(&server, JWKS_PRIMARY, 1).await;

    let cache = key_cache(Arc::new(ManualClock::at_unix(NOW)));
    let url = keys_url(&server);

    let err = cache.get_current_key_set(&url).await.unwrap_err();
    match err {
        VerificationError::KeySetFetch { url: failed, reason } => {
            assert_eq!(failed, url);
            assert!(reason.contains("500"), "unexpected reason: {reason}");
        }
        other => panic!("expected KeySetFetch, got {other:?}"),
    }

    let key_set = cache.get_current_key_set(&url).await.unwrap();
    assert!(key_set.find(PRIMARY_KID).is_some());
}

#[tokio::test]
async fn test_invalid_document_is_fetch_error() {
    let server = MockServer::start().await;
    mount_jwks(&server, "<html>maintenance</html>", 1).await;

    let cache = key_cache(Arc::new(ManualClock::at_unix(NOW)));
    let err = cache
        .get_current_key_set(&keys_url(&server))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VerificationError::KeySetFetch { ref reason, .. } if reason.starts_with("invalid JWKS document")
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_fetch_error() {
    let server = MockServer::start().await;
    let url = keys_url(&server);
    drop(server);

    let cache = key_cache(Arc::new(ManualClock::at_unix(NOW)));
    let err = cache.get_current_key_set(&url).await.unwrap_err();

    assert_eq!(err.error_code(), "KEY_SET_FETCH_FAILED");
}

#[tokio::test]
async fn test_concurrent_first_use_fetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEYS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(JWKS_PRIMARY, "application/json")
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = key_cache(Arc::new(ManualClock::at_unix(NOW)));
    let url = keys_url(&server);

    let lookups = (0..10).map(|_| {
        let cache = Arc::clone(&cache);
        let url = url.clone();
        tokio::spawn(async move { cache.get_current_key_set(&url).await })
    });
    for handle in futures::future::join_all(lookups).await {
        assert!(handle.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_concurrent_misses_during_outage_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEYS_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_delay(std::time::Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = key_cache(Arc::new(ManualClock::at_unix(NOW)));
    let url = keys_url(&server);

    let started = std::time::Instant::now();
    let lookups = (0..5).map(|_| {
        let cache = Arc::clone(&cache);
        let url = url.clone();
        tokio::spawn(async move { cache.get_current_key_set(&url).await })
    });
    for handle in futures::future::join_all(lookups).await {
        assert!(matches!(
            handle.unwrap(),
            Err(VerificationError::KeySetFetch { .. })
        ));
    }

    assert!(
        started.elapsed() < std::time::Duration::from_millis(900),
        "callers waited {:?}",
        started.elapsed()
    );
}
