//! YTS driver
//!
//! Movie-only JSON API that searches natively by IMDB id. Sizes arrive as
//! exact byte counts per encode, so no size parsing is involved.

use super::{TorrentDriver, DRIVER_HTTP_TIMEOUT};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use magnetarr_core::{
    retry_transient, MediaType, Resolution, Result, RetryConfig, SearchQuery, Torrent,
    TorrentExtras,
};
use magnetarr_fetch::{FetchOptions, ProtectedFetcher};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MIRRORS: [&str; 3] = ["https://yts.mx", "https://yts.am", "https://yts.lt"];

pub struct YtsDriver {
    fetcher: Arc<ProtectedFetcher>,
    mirrors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct YtsResponse {
    status: String,
    #[serde(default)]
    data: Option<YtsData>,
}

#[derive(Debug, Deserialize)]
struct YtsData {
    #[serde(default)]
    movies: Vec<YtsMovie>,
}

#[derive(Debug, Deserialize)]
struct YtsMovie {
    title_long: String,
    #[serde(default)]
    imdb_code: Option<String>,
    #[serde(default)]
    torrents: Vec<YtsTorrent>,
}

#[derive(Debug, Deserialize)]
struct YtsTorrent {
    hash: String,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    size_bytes: Option<i64>,
    #[serde(default)]
    seeds: Option<i32>,
    #[serde(default)]
    date_uploaded_unix: Option<i64>,
}

impl YtsDriver {
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
        // The API matches IMDB ids exactly; only fall back to free text.
        let term = query
            .imdb_id
            .clone()
            .or_else(|| query.title.clone())
            .unwrap_or_else(|| query.keywords.clone());

        let opts = FetchOptions::default().timeout(DRIVER_HTTP_TIMEOUT);
        let retry = RetryConfig::default();
        let mut last_err = None;

        for mirror in &self.mirrors {
            let url = format!(
                "{}/api/v2/list_movies.json?query_term={}&limit=50",
                mirror,
                urlencoding::encode(&term)
            );
            let outcome = match retry_transient(&retry, "yts search", || {
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
                debug!(mirror, status = outcome.status, challenge = ?outcome.challenge, "yts mirror unusable");
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
        let parsed: YtsResponse = serde_json::from_str(body)
            .map_err(|e| magnetarr_core::MagnetarrError::SerializationError(e.to_string()))?;
        if parsed.status != "ok" {
            return Ok(Vec::new());
        }

        let movies = parsed.data.map(|d| d.movies).unwrap_or_default();
        let mut results = Vec::new();
        for movie in movies {
            // When the query carried an IMDB id, drop fuzzy off-target
            // matches the API sometimes pads results with.
            if let (Some(want), Some(have)) = (&query.imdb_id, &movie.imdb_code) {
                if want != have {
                    continue;
                }
            }
            for torrent in movie.torrents {
                let quality = torrent.quality.as_deref().unwrap_or("unknown");
                let title = format!("{} [{}] [YTS]", movie.title_long, quality);
                results.push(Torrent {
                    info_hash: torrent.hash.to_lowercase(),
                    magnet_uri: Torrent::magnet_for(&torrent.hash.to_lowercase(), &title),
                    resolution: Resolution::from_title(&title),
                    title,
                    size_bytes: torrent.size_bytes.unwrap_or(0),
                    seeders: torrent.seeds.unwrap_or(0),
                    uploaded_at: torrent
                        .date_uploaded_unix
                        .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    provider: self.id().to_string(),
                    media_type: MediaType::Movie,
                    imdb_id: movie.imdb_code.clone(),
                    kitsu_id: None,
                    season: None,
                    episode: None,
                    extras: TorrentExtras::default(),
                });
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl TorrentDriver for YtsDriver {
    fn id(&self) -> &str {
        "yts"
    }

    fn supports(&self, media: MediaType) -> bool {
        media == MediaType::Movie
    }

    async fn search(&self, query: &SearchQuery) -> Vec<Torrent> {
        match self.search_inner(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "yts search failed");
                Vec::new()
            }
        }
    }
}
