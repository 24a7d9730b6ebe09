use crate::models::{CacheEntry, CacheKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// TTL-aware store for assembled profiles.
///
/// Entries are replaced wholesale by `set` and dropped once expired; nothing
/// is refreshed in place.
#[async_trait]
pub trait ProfileCache: Send + Sync {
    /// Live entry for `key` at `now`, if any. Expired entries are dropped.
    async fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry>;
    async fn set(&self, key: CacheKey, entry: CacheEntry);
    async fn evict(&self, key: &CacheKey) -> bool;
    /// Drop every option variant cached for `username`. Returns how many went.
    async fn evict_user(&self, username: &str) -> usize;
    async fn clear(&self);
    async fn len(&self) -> usize;
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileCache for MemoryCache {
    async fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check under the write lock: a fresh set may have landed meanwhile
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            debug!("Cache entry for {} expired", key.username);
        }
        entries.get(key).cloned()
    }

    /// Also sweeps every entry already expired at `entry.created_at`.
    async fn set(&self, key: CacheKey, entry: CacheEntry) {
        let now = entry.created_at;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        if entries.len() < before {
            debug!("Swept {} expired cache entries", before - entries.len());
        }
        entries.insert(key, entry);
    }

    async fn evict(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn evict_user(&self, username: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| k.username != username);
        before - entries.len()
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
