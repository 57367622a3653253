//! In-memory cache with TTL support

use super::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// TTL cache keyed by string, serde-serialized values.
pub struct MemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_size: usize,
}

struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            max_size,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.read().await;
        let entry = store.get(key)?;
        if entry.expires_at <= Instant::now() {
            trace!("cache entry expired for key: {}", key);
            return None;
        }
        match serde_json::from_slice(&entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("failed to deserialize cache entry for key {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let data =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let entry = CacheEntry {
            data,
            expires_at: Instant::now() + ttl,
        };

        let mut store = self.store.write().await;
        if store.len() >= self.max_size {
            // Cheap pressure valve: drop expired entries, then oldest-ish.
            let now = Instant::now();
            store.retain(|_, entry| entry.expires_at > now);
            if store.len() >= self.max_size {
                let excess = store.len() + 1 - self.max_size;
                let keys: Vec<String> = store.keys().take(excess).cloned().collect();
                for key in keys {
                    store.remove(&key);
                }
                debug!("evicted {} cache entries", excess);
            }
        }
        store.insert(key.to_string(), entry);
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.store.write().await.remove(key);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}
