use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tracing::debug;

use crate::models::{cache::CacheEntry, error::Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Query results kept for a fixed TTL. Writes to the store never
/// invalidate entries; staleness is bounded by the TTL alone.
#[derive(Debug)]
pub struct ServingCache<T> {
    entries: DashMap<String, CacheEntry<Arc<T>>>,
    ttl: Duration,
}

impl<T> ServingCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Live entry for `key`; an expired one is dropped and reported absent.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    /// Stores `value` and sweeps out every expired entry, so keys that
    /// are never requested again do not pile up.
    pub fn insert(&self, key: impl Into<String>, value: T) -> Arc<T> {
        self.purge_expired();
        let value = Arc::new(value);
        self.entries
            .insert(key.into(), CacheEntry::new(value.clone(), self.ttl));
        value
    }

    /// Returns the cached value or computes and caches it. Errors are
    /// passed through and nothing is cached. Concurrent callers may both
    /// compute after an expiry; the last write wins.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(key) {
            debug!(key, "serving cache hit");
            return Ok(hit);
        }

        debug!(key, "serving cache miss");
        let value = compute().await?;
        Ok(self.insert(key, value))
    }

    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
