//! Signing key set caching.
//!
//! Provider key sets are fetched on demand and trusted for a bounded window
//! (5 minutes by default). The storage backend is injected through
//! [`KeyValueStore`] so tests and multi-process deployments can swap it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use moka::Expiry;
use moka::sync::Cache;
use tracing::{debug, warn};

use super::clock::Clock;
use super::error::VerificationError;
use super::fetcher::KeySetFetcher;
use super::keyset::{CachedKeySet, SigningKeySet};

/// Default store capacity (number of provider key sets).
const DEFAULT_STORE_CAPACITY: u64 = 16;

/// Default trust window for a fetched key set (5 minutes).
pub const DEFAULT_KEY_SET_TTL: Duration = Duration::from_secs(300);

/// Default minimum time between forced refreshes of one key set.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Remember-with-TTL storage for key sets.
pub trait KeyValueStore: Send + Sync {
    /// Returns the entry stored under `key`, fresh or not.
    fn get(&self, key: &str) -> Option<CachedKeySet>;

    /// Stores an entry; it may be evicted once `entry.ttl` has elapsed.
    fn set(&self, key: &str, entry: CachedKeySet);

    /// Drops the entry stored under `key`.
    fn remove(&self, key: &str);
}

/// Evicts each entry after its own TTL.
struct KeySetExpiry;

impl Expiry<String, CachedKeySet> for KeySetExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedKeySet,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedKeySet,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process key set store backed by Moka.
///
/// Thread-safe and suitable for concurrent access; entries are replaced
/// whole, so readers never observe a partial key set.
#[derive(Clone)]
pub struct MokaKeyStore {
    cache: Cache<String, CachedKeySet>,
}

impl MokaKeyStore {
    /// Creates a store with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }

    /// Creates a store holding at most `max_capacity` key sets.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(KeySetExpiry)
            .build();

        Self { cache }
    }

    /// Returns the number of entries currently in the store.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for MokaKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MokaKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaKeyStore")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl KeyValueStore for MokaKeyStore {
    fn get(&self, key: &str) -> Option<CachedKeySet> {
        self.cache.get(key)
    }

    fn set(&self, key: &str, entry: CachedKeySet) {
        self.cache.insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }
}

/// Outcome of one key set fetch, shared by every caller waiting on it.
type FetchAttempt = Shared<BoxFuture<'static, Result<Arc<SigningKeySet>, VerificationError>>>;

/// Per-URL bookkeeping for fetches.
#[derive(Default)]
struct FetchState {
    in_flight: HashMap<String, FetchAttempt>,
    last_forced_refresh: HashMap<String, DateTime<Utc>>,
}

fn lock_state(state: &Mutex<FetchState>) -> MutexGuard<'_, FetchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch-on-miss cache of provider signing key sets.
///
/// At most one fetch per keys URL is in flight. Every caller that needs the
/// key set while it runs awaits the same attempt and receives its result,
/// success or error. Forced refreshes are rate limited per URL.
pub struct KeySetCache {
    store: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn KeySetFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    min_refresh_interval: Duration,
    state: Arc<Mutex<FetchState>>,
}

impl fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetCache")
            .field("clock", &self.clock)
            .field("ttl", &self.ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("store", &"[dyn KeyValueStore]")
            .field("fetcher", &"[dyn KeySetFetcher]")
            .finish()
    }
}

enum Refresh {
    Join(FetchAttempt),
    RateLimited,
}

impl KeySetCache {
    /// Creates a cache over the given store and fetcher.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn KeySetFetcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            state: Arc::new(Mutex::new(FetchState::default())),
        }
    }

    /// Set the minimum time between two forced refreshes of one key set.
    #[must_use]
    pub const fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Store key for a provider's key set.
    #[must_use]
    pub fn cache_key(keys_url: &str) -> String {
        format!("jwks:{keys_url}")
    }

    /// Trust window applied to fetched key sets.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The clock freshness is judged against.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the trusted key set for `keys_url`, fetching it on miss or
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::KeySetFetch` when a needed fetch fails.
    /// Nothing is stored in that case.
    pub async fn get_current_key_set(
        &self,
        keys_url: &str,
    ) -> Result<Arc<SigningKeySet>, VerificationError> {
        let cache_key = Self::cache_key(keys_url);

        if let Some(key_set) = self.fresh(&cache_key) {
            debug!(keys_url = %keys_url, "Using cached signing key set");
            return Ok(key_set);
        }

        let attempt = {
            let mut state = lock_state(&self.state);
            if let Some(attempt) = state.in_flight.get(&cache_key) {
                debug!(keys_url = %keys_url, "Joining in-flight signing key set fetch");
                attempt.clone()
            } else if let Some(key_set) = self.fresh(&cache_key) {
                // A fetch finished between the first check and taking the lock
                return Ok(key_set);
            } else {
                self.start_fetch(&mut state, keys_url, &cache_key)
            }
        };

        attempt.await
    }

    /// Re-fetches the key set for `keys_url` regardless of freshness.
    ///
    /// Joins a fetch already in flight instead of starting another. Within
    /// the minimum refresh interval of the previous forced refresh, falls
    /// back to [`Self::get_current_key_set`].
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::KeySetFetch` when the fetch fails. The
    /// previous entry, if any, is left in place.
    pub async fn refresh(&self, keys_url: &str) -> Result<Arc<SigningKeySet>, VerificationError> {
        let cache_key = Self::cache_key(keys_url);
        let now = self.clock.now();

        let next = {
            let mut state = lock_state(&self.state);
            if let Some(attempt) = state.in_flight.get(&cache_key) {
                Refresh::Join(attempt.clone())
            } else if state
                .last_forced_refresh
                .get(&cache_key)
                .and_then(|last| (now - *last).to_std().ok())
                .is_some_and(|since_last| since_last < self.min_refresh_interval)
            {
                Refresh::RateLimited
            } else {
                state.last_forced_refresh.insert(cache_key.clone(), now);
                Refresh::Join(self.start_fetch(&mut state, keys_url, &cache_key))
            }
        };

        match next {
            Refresh::Join(attempt) => attempt.await,
            Refresh::RateLimited => {
                warn!(keys_url = %keys_url, "Signing key set refresh rate limited, using cache");
                self.get_current_key_set(keys_url).await
            }
        }
    }

    /// Drops the stored key set for `keys_url`.
    pub fn invalidate(&self, keys_url: &str) {
        self.store.remove(&Self::cache_key(keys_url));
    }

    fn fresh(&self, cache_key: &str) -> Option<Arc<SigningKeySet>> {
        self.store
            .get(cache_key)
            .filter(|entry| entry.is_fresh(self.clock.now()))
            .map(|entry| entry.key_set)
    }

    /// Registers a new fetch for `cache_key`. The caller holds the state lock.
    fn start_fetch(
        &self,
        state: &mut FetchState,
        keys_url: &str,
        cache_key: &str,
    ) -> FetchAttempt {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let shared_state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let keys_url = keys_url.to_string();
        let key = cache_key.to_string();

        let attempt = async move {
            let result = fetcher.fetch(&keys_url).await.map(|key_set| {
                let entry = CachedKeySet::new(key_set, clock.now(), ttl);
                let key_set = Arc::clone(&entry.key_set);
                store.set(&key, entry);
                key_set
            });
            // Stored before removal, so a caller that misses the attempt sees the entry
            lock_state(&shared_state).in_flight.remove(&key);
            result
        }
        .boxed()
        .shared();

        state
            .in_flight
            .insert(cache_key.to_string(), attempt.clone());
        attempt
    }
}

