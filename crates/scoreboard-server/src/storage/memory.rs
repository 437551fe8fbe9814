//! In-memory cache using DashMap
//!
//! Holds serialized leaderboards keyed by `leaderboard:{org}:{type}:{category}`.
//! Entries expire after their TTL; a background task sweeps expired keys.

use bytes::Bytes;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Simple in-memory cache with TTL support
pub struct MemoryCache {
    data: Arc<DashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|expires| now > expires).unwrap_or(false)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        let cache = Self {
            data: Arc::new(DashMap::new()),
        };
        cache.start_cleanup_task();
        cache
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let entry = self.data.get(key)?;
        if entry.is_expired(Instant::now()) {
            drop(entry);
            self.data.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set_with_ttl(&self, key: String, value: Bytes, ttl: Duration) {
        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Typed read; entries that fail to decode are treated as misses
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.delete(key);
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: String, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_with_ttl(key, Bytes::from(bytes), ttl),
            Err(e) => tracing::warn!("Failed to serialize cache entry {}: {}", key, e),
        }
    }

    pub fn delete(&self, key: &str) {
        self.data.remove(key);
    }

    /// Removes every key starting with `prefix`, returning how many went
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.data.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn start_cleanup_task(&self) {
        let data = self.data.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let now = Instant::now();
                data.retain(|_, entry| !entry.is_expired(now));
            }
        });
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}
