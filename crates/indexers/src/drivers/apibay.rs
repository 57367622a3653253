//! PirateBay driver (apibay JSON API)
//!
//! Covers movies and series. Searches by IMDB id when available, free
//! text otherwise. The API signals an empty result set with a sentinel
//! row rather than an empty array.

use super::{TorrentDriver, DRIVER_HTTP_TIMEOUT};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use magnetarr_core::{
    normalize_info_hash, retry_transient, MediaType, Resolution, Result, RetryConfig, SearchQuery,
    Torrent, TorrentExtras,
};
use magnetarr_fetch::{FetchOptions, ProtectedFetcher};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MIRRORS: [&str; 1] = ["https://apibay.org"];

/// Video categories: movies 201/207, HD movies, TV 205/208.
const MOVIE_CATEGORIES: [&str; 3] = ["201", "202", "207"];
const SERIES_CATEGORIES: [&str; 2] = ["205", "208"];

pub struct ApibayDriver {
    fetcher: Arc<ProtectedFetcher>,
    mirrors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApibayEntry {
    name: String,
    info_hash: String,
    #[serde(default)]
    seeders: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    added: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    imdb: Option<String>,
}

impl ApibayDriver {
    pub fn new(fetcher: Arc<ProtectedFetcher>) -> Self {
        Self {
            fetcher,
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[cfg(test)]
    pub fn with_mirrors(fetcher: Arc<ProtectedFetcher>, mirrors: Vec<String>) -> Self {
        Self { fetcher, mirrors }
    }

    async fn search_inner(&self, query: &SearchQuery) -> Result<Vec<Torrent>> {
        let term = query
            .imdb_id
            .clone()
            .unwrap_or_else(|| query.keywords.clone());

        let opts = FetchOptions::default().timeout(DRIVER_HTTP_TIMEOUT);
        let retry = RetryConfig::default();
        let mut last_err = None;

        for mirror in &self.mirrors {
            let url = format!("{}/q.php?q={}&cat=0", mirror, urlencoding::encode(&term));
            let outcome = match retry_transient(&retry, "apibay search", || {
                self.fetcher.fetch(&url, &opts)
            })
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            if !outcome.is_ok() {
                debug!(mirror, status = outcome.status, challenge = ?outcome.challenge, "apibay mirror unusable");
                continue;
            }
            return self.parse_body(&outcome.body, query);
        }

        if let Some(e) = last_err {
            return Err(e);
        }
        Ok(Vec::new())
    }

    fn parse_body(&self, body: &str, query: &SearchQuery) -> Result<Vec<Torrent>> {
        let entries: Vec<ApibayEntry> = serde_json::from_str(body)
            .map_err(|e| magnetarr_core::MagnetarrError::SerializationError(e.to_string()))?;

        let wanted: &[&str] = match query.media_type {
            MediaType::Series => &SERIES_CATEGORIES,
            _ => &MOVIE_CATEGORIES,
        };

        let mut results = Vec::new();
        for entry in entries {
            // Sentinel row for "nothing found".
            if entry.name == "No results returned" {
                continue;
            }
            let Some(info_hash) = normalize_info_hash(&entry.info_hash) else {
                continue;
            };
            if let Some(category) = &entry.category {
                if !wanted.contains(&category.as_str()) {
                    continue;
                }
            }
            let trusted = matches!(entry.status.as_deref(), Some("vip") | Some("trusted"));
            results.push(Torrent {
                magnet_uri: Torrent::magnet_for(&info_hash, &entry.name),
                resolution: Resolution::from_title(&entry.name),
                info_hash,
                title: entry.name,
                size_bytes: entry
                    .size
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                seeders: entry
                    .seeders
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                uploaded_at: entry
                    .added
                    .as_deref()
                    .and_then(|s| s.parse::<i64>().ok())
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                provider: self.id().to_string(),
                media_type: query.media_type,
                imdb_id: entry.imdb.clone().filter(|i| !i.is_empty()).or_else(|| query.imdb_id.clone()),
                kitsu_id: query.kitsu_id,
                season: query.season,
                episode: query.episode,
                extras: TorrentExtras {
                    trusted,
                    ..TorrentExtras::default()
                },
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl TorrentDriver for ApibayDriver {
    fn id(&self) -> &str {
        "thepiratebay"
    }

    fn supports(&self, media: MediaType) -> bool {
        matches!(media, MediaType::Movie | MediaType::Series)
    }

    async fn search(&self, query: &SearchQuery) -> Vec<Torrent> {
        match self.search_inner(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "apibay search failed");
                Vec::new()
            }
        }
    }
}
