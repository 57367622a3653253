//! Shared cache of solved challenge sessions
//!
//! Host-keyed, in-memory first, with an optional persistent store behind
//! it so sessions survive restarts. Reads take the read lock only; writes
//! are serialized per the outer per-host solve lock.

use chrono::{DateTime, Utc};
use magnetarr_core::{BypassSession, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct SessionCache {
    inner: RwLock<HashMap<String, BypassSession>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionCache {
    pub fn new(store: Option<Arc<dyn SessionStore>>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Usable session for a host, consulting the persistent store on a
    /// memory miss.
    pub async fn get(&self, host: &str, now: DateTime<Utc>) -> Option<BypassSession> {
        {
            let map = self.inner.read().await;
            if let Some(session) = map.get(host) {
                if session.is_usable(now) {
                    return Some(session.clone());
                }
            }
        }

        let store = self.store.as_ref()?;
        match store.get(host).await {
            Ok(Some(session)) if session.is_usable(now) => {
                self.inner
                    .write()
                    .await
                    .insert(host.to_string(), session.clone());
                Some(session)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(host, error = %e, "session store read failed");
                None
            }
        }
    }

    /// Cache a freshly solved session and persist it best-effort.
    pub async fn put(&self, session: BypassSession) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put(&session).await {
                warn!(host = %session.host, error = %e, "session store write failed");
            }
        }
        self.inner
            .write()
            .await
            .insert(session.host.clone(), session);
    }

    pub async fn evict(&self, host: &str) {
        self.inner.write().await.remove(host);
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(host).await {
                warn!(host, error = %e, "session store delete failed");
            }
        }
    }

    /// Drop expired entries from memory and the backing store.
    pub async fn purge_expired(&self, now: DateTime<Utc>) {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, session| !session.is_expired(now));
        let removed = before - map.len();
        drop(map);
        if removed > 0 {
            debug!(removed, "purged expired sessions from memory");
        }
        if let Some(store) = &self.store {
            match store.purge_expired(now).await {
                Ok(n) if n > 0 => debug!(rows = n, "purged expired sessions from store"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "session store purge failed"),
            }
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use magnetarr_core::SessionCookie;

    fn session(host: &str, expires_in: i64, now: DateTime<Utc>) -> BypassSession {
        BypassSession {
            host: host.to_string(),
            cookies: vec![SessionCookie {
                name: "cf_clearance".to_string(),
                value: "v".to_string(),
                domain: None,
                path: None,
                expires: None,
            }],
            user_agent: "UA".to_string(),
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    #[tokio::test]
    async fn caches_and_expires() {
        let now = Utc::now();
        let cache = SessionCache::new(None);
        cache.put(session("a.example", 60, now)).await;
        cache.put(session("b.example", -1, now)).await;

        assert!(cache.get("a.example", now).await.is_some());
        // Expired entry is treated as absent.
        assert!(cache.get("b.example", now).await.is_none());
        // Unknown host misses.
        assert!(cache.get("c.example", now).await.is_none());
    }

    #[tokio::test]
    async fn purge_removes_expired_only() {
        let now = Utc::now();
        let cache = SessionCache::new(None);
        cache.put(session("a.example", 60, now)).await;
        cache.put(session("b.example", -5, now)).await;
        cache.purge_expired(now).await;
        assert_eq!(cache.len().await, 1);
    }
}
