//! In-memory definition store
//!
//! Holds the parsed definitions the sync task maintains. Reads are cheap
//! clones behind an RwLock; the dispatcher and probe loop consult it on
//! every pass.

use super::catalog;
use magnetarr_core::IndexerDefinition;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct DefinitionStore {
    inner: RwLock<HashMap<String, IndexerDefinition>>,
    /// Open question upstream: synced links strictly replace the curated
    /// fallbacks (default), or get merged with them.
    merge_fallback_domains: bool,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::with_merge_fallbacks(false)
    }

    pub fn with_merge_fallbacks(merge_fallback_domains: bool) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            merge_fallback_domains,
        }
    }

    pub async fn insert(&self, definition: IndexerDefinition) {
        self.inner
            .write()
            .await
            .insert(definition.id.clone(), definition);
    }

    pub async fn get(&self, id: &str) -> Option<IndexerDefinition> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Mirror URLs for an indexer: synced links when present, curated
    /// fallbacks otherwise (union of both with the merge knob on).
    pub async fn domains(&self, id: &str) -> Vec<String> {
        let synced = self
            .get(id)
            .await
            .map(|d| d.links)
            .unwrap_or_default();
        let fallbacks = catalog::fallback_domains(id);

        if synced.is_empty() {
            return fallbacks.iter().map(|d| d.to_string()).collect();
        }
        if !self.merge_fallback_domains {
            return synced;
        }
        let mut merged = synced;
        for domain in fallbacks {
            if !merged.iter().any(|d| d == domain) {
                merged.push(domain.to_string());
            }
        }
        merged
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}
