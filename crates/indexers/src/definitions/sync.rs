//! Upstream definition sync task
//!
//! Periodically refreshes the definition store from the upstream source:
//! one YAML document per indexer id at `{base}/definitions/v11/{id}.yml`.
//! Each fetched document is written to a local cache directory so restarts
//! do not depend on the upstream being reachable, and the parsed
//! capability metadata is pushed into the health row so the dispatcher
//! never re-parses definitions.

use super::{parser::parse_definition, store::DefinitionStore};
use crate::definitions::catalog;
use chrono::Utc;
use magnetarr_core::{
    HealthStore, IndexerDefinition, IndexerHealth, MagnetarrError, Result, Visibility,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upstream base, without the `/definitions/v11` suffix.
    pub base_url: String,
    pub cache_dir: PathBuf,
    /// Minimum pause between upstream requests.
    pub pace: Duration,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            pace: Duration::from_millis(100),
            user_agent: concat!("magnetarr/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
}

/// Summary index written next to the cached documents.
#[derive(Debug, Serialize, Deserialize)]
struct SyncIndex {
    last_sync_at: chrono::DateTime<Utc>,
    ids: Vec<String>,
}

pub struct DefinitionSync {
    config: SyncConfig,
    client: reqwest::Client,
    store: Arc<DefinitionStore>,
    health: Arc<dyn HealthStore>,
}

impl DefinitionSync {
    pub fn new(
        config: SyncConfig,
        store: Arc<DefinitionStore>,
        health: Arc<dyn HealthStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| MagnetarrError::ConfigurationError {
                field: "definition_sync".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            config,
            client,
            store,
            health,
        })
    }

    /// One full pass: every catalog id plus anything already in the store.
    /// Per-id failures are logged and skipped, never fatal.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> SyncSummary {
        let mut ids: Vec<String> = catalog::KNOWN_INDEXERS
            .iter()
            .map(|id| id.to_string())
            .collect();
        for id in self.store.list_ids().await {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.cache_dir).await {
            warn!(error = %e, "could not create definition cache dir");
        }

        let mut summary = SyncSummary::default();
        let mut synced_ids = Vec::new();
        for id in &ids {
            match self.sync_one(id).await {
                Ok(()) => {
                    summary.synced += 1;
                    synced_ids.push(id.clone());
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(indexer = %id, error = %e, "definition sync failed");
                }
            }
            tokio::time::sleep(self.config.pace).await;
        }

        self.write_index(&synced_ids).await;
        info!(
            synced = summary.synced,
            failed = summary.failed,
            "definition sync pass complete"
        );
        summary
    }

    async fn sync_one(&self, id: &str) -> Result<()> {
        let url = format!(
            "{}/definitions/v11/{}.yml",
            self.config.base_url.trim_end_matches('/'),
            id
        );
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| MagnetarrError::NetworkError {
                url: url.clone(),
                error: e.to_string(),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        if !response.status().is_success() {
            return Err(MagnetarrError::ExternalServiceError {
                service: "definition source".to_string(),
                error: format!("{} for {}", response.status(), url),
            });
        }

        let document = response
            .text()
            .await
            .map_err(|e| MagnetarrError::NetworkError {
                url,
                error: format!("body read failed: {}", e),
                retryable: false,
            })?;

        let definition = parse_definition(id, &document)?;
        self.persist_capabilities(&definition).await?;

        let cache_path = self.config.cache_dir.join(format!("{}.yml", id));
        if let Err(e) = tokio::fs::write(&cache_path, &document).await {
            warn!(indexer = %id, error = %e, "could not cache definition document");
        }

        debug!(indexer = %id, types = ?definition.content_types, "definition refreshed");
        self.store.insert(definition).await;
        Ok(())
    }

    /// Push parsed capability metadata into the health row, preserving any
    /// existing counters.
    async fn persist_capabilities(&self, definition: &IndexerDefinition) -> Result<()> {
        let mut row = self
            .health
            .get(&definition.id)
            .await?
            .unwrap_or_else(|| IndexerHealth::new(&definition.id));
        row.display_name = definition.display_name.clone();
        row.language = definition.language.clone();
        row.is_public = definition.visibility == Visibility::Public;
        row.content_types = definition.content_types.clone();
        self.health.upsert(&row).await
    }

    async fn write_index(&self, ids: &[String]) {
        let index = SyncIndex {
            last_sync_at: Utc::now(),
            ids: ids.to_vec(),
        };
        let path = self.config.cache_dir.join("index.json");
        match serde_json::to_vec_pretty(&index) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!(error = %e, "could not write sync index");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize sync index"),
        }
    }
}

/// Rehydrate the store from the local cache directory at startup.
pub async fn load_cached_definitions(
    cache_dir: &Path,
    store: &DefinitionStore,
) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(cache_dir).await {
        Ok(entries) => entries,
        // A missing cache dir just means a cold start.
        Err(_) => return Ok(0),
    };

    let mut loaded = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(document) => match parse_definition(&id, &document) {
                Ok(definition) => {
                    store.insert(definition).await;
                    loaded += 1;
                }
                Err(e) => warn!(indexer = %id, error = %e, "cached definition unparseable"),
            },
            Err(e) => warn!(indexer = %id, error = %e, "cached definition unreadable"),
        }
    }
    Ok(loaded)
}
