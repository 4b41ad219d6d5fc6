//! Keyed TTL cache with single-flight load coalescing.
//!
//! Concurrent misses on the same key invoke the loader exactly once: the
//! first caller installs a shared load future, later callers clone and
//! await it. A failed load is never written to the cache; every joined
//! caller observes the error, and the next call starts a fresh load.
//!
//! Expired entries are not proactively evicted; they are overwritten on
//! the next load. Expiry uses `tokio::time::Instant`, so tests can drive
//! the clock with `tokio::time::{pause, advance}`.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// A cache load failure. Clonable so every coalesced caller receives it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache load failed: {0}")]
    LoadFailed(String),
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    pending: HashMap<String, SharedLoad<V>>,
}

/// A keyed cache with per-key expiration and single-flight coalescing.
pub struct TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    ttl: Duration,
    // One lock guards both maps so the fresh-check and the pending
    // installation are atomic with respect to each other. Never held
    // across an await.
    inner: Mutex<Inner<V>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache whose entries live for `ttl` after a successful load.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    /// Return the cached value for `key`, joining an in-flight load or
    /// starting `loader` on a miss.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let shared = {
            let mut inner = self.inner.lock().await;

            if let Some(entry) = inner.entries.get(key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value.clone());
                }
            }

            match inner.pending.get(key) {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let load: SharedLoad<V> = loader().boxed().shared();
                    inner.pending.insert(key.to_string(), load.clone());
                    load
                }
            }
        };

        let result = shared.await;

        // Whichever joined caller resumes first publishes the outcome;
        // the publication is idempotent, so the rest skip it.
        let mut inner = self.inner.lock().await;
        if inner.pending.remove(key).is_some() {
            if let Ok(value) = &result {
                inner.entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
        }
        result
    }

    /// Drop the stored entry for `key`. An in-flight load is unaffected.
    pub async fn invalidate(&self, key: &str) {
        self.inner.lock().await.entries.remove(key);
    }

    /// Drop every stored entry.
    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
