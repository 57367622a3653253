//! EZTV driver
//!
//! Series-only JSON API addressed by numeric IMDB id with explicit
//! season/episode fields per entry. Without an IMDB id there is nothing
//! to ask it.

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

const DEFAULT_MIRRORS: [&str; 3] = ["https://eztv.re", "https://eztv.wf", "https://eztv.tf"];

pub struct EztvDriver {
    fetcher: Arc<ProtectedFetcher>,
    mirrors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EztvResponse {
    #[serde(default)]
    torrents: Vec<EztvTorrent>,
}

#[derive(Debug, Deserialize)]
struct EztvTorrent {
    title: String,
    hash: String,
    #[serde(default)]
    magnet_url: Option<String>,
    #[serde(default)]
    size_bytes: Option<String>,
    #[serde(default)]
    seeds: Option<i32>,
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    episode: Option<String>,
    #[serde(default)]
    date_released_unix: Option<i64>,
}

impl EztvDriver {
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
        let Some(imdb_numeric) = query.imdb_numeric() else {
            debug!("eztv skipped: no imdb id in query");
            return Ok(Vec::new());
        };

        let opts = FetchOptions::default().timeout(DRIVER_HTTP_TIMEOUT);
        let retry = RetryConfig::default();
        let mut last_err = None;

        for mirror in &self.mirrors {
            let url = format!(
                "{}/api/get-torrents?imdb_id={}&limit=100&page={}",
                mirror, imdb_numeric, query.page
            );
            let outcome = match retry_transient(&retry, "eztv search", || {
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
                debug!(mirror, status = outcome.status, challenge = ?outcome.challenge, "eztv mirror unusable");
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
        let parsed: EztvResponse = serde_json::from_str(body)
            .map_err(|e| magnetarr_core::MagnetarrError::SerializationError(e.to_string()))?;

        let mut results = Vec::new();
        for torrent in parsed.torrents {
            let season: Option<u32> = torrent.season.as_deref().and_then(|s| s.parse().ok());
            let episode: Option<u32> = torrent.episode.as_deref().and_then(|e| e.parse().ok());

            // Episode 0 marks a season pack; keep packs for the requested
            // season, drop entries for other episodes.
            if let Some(want_season) = query.season {
                if season.is_some() && season != Some(want_season) {
                    continue;
                }
            }
            if let (Some(want_episode), Some(have)) = (query.episode, episode) {
                if have != 0 && have != want_episode {
                    continue;
                }
            }

            let info_hash = torrent.hash.to_lowercase();
            let magnet_uri = torrent
                .magnet_url
                .clone()
                .unwrap_or_else(|| Torrent::magnet_for(&info_hash, &torrent.title));
            results.push(Torrent {
                magnet_uri,
                resolution: Resolution::from_title(&torrent.title),
                size_bytes: torrent
                    .size_bytes
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                seeders: torrent.seeds.unwrap_or(0),
                uploaded_at: torrent
                    .date_released_unix
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                provider: self.id().to_string(),
                media_type: MediaType::Series,
                imdb_id: query.imdb_id.clone(),
                kitsu_id: None,
                season,
                episode,
                title: torrent.title,
                info_hash,
                extras: TorrentExtras::default(),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl TorrentDriver for EztvDriver {
    fn id(&self) -> &str {
        "eztv"
    }

    fn supports(&self, media: MediaType) -> bool {
        media == MediaType::Series
    }

    async fn search(&self, query: &SearchQuery) -> Vec<Torrent> {
        match self.search_inner(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "eztv search failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnetarr_core::{ContentId, SearchRequest};
    use magnetarr_fetch::SessionCache;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query(season: Option<u32>, episode: Option<u32>) -> SearchQuery {
        let request = SearchRequest::new(
            ContentId::Imdb { id: "tt0944947".to_string() },
            MediaType::Series,
        )
        .with_episode(season, episode);
        SearchQuery::from_request(&request, Some("Game of Thrones"))
    }

    fn api_body() -> serde_json::Value {
        serde_json::json!({
            "torrents_count": 3,
            "torrents": [
                {"title": "Game of Thrones S01E02 1080p", "hash": "0A1B2C3D4E5F60718293A4B5C6D7E8F901234567",
                 "size_bytes": "2147483648", "seeds": 55, "season": "1", "episode": "2",
                 "date_released_unix": 1_600_000_000},
                {"title": "Game of Thrones S01 Season Pack", "hash": "1111111111111111111111111111111111111111",
                 "size_bytes": "21474836480", "seeds": 12, "season": "1", "episode": "0",
                 "date_released_unix": 1_600_000_100},
                {"title": "Game of Thrones S02E01 720p", "hash": "2222222222222222222222222222222222222222",
                 "size_bytes": "1073741824", "seeds": 9, "season": "2", "episode": "1",
                 "date_released_unix": 1_600_000_200}
            ]
        })
    }

    #[tokio::test]
    async fn filters_by_season_and_episode_keeping_packs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get-torrents"))
            .and(query_param("imdb_id", "944947"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_body()))
            .mount(&server)
            .await;

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = EztvDriver::with_mirrors(fetcher, vec![server.uri()]);

        let results = driver.search(&query(Some(1), Some(2))).await;
        let titles: Vec<&str> = results.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Game of Thrones S01E02 1080p", "Game of Thrones S01 Season Pack"]
        );
        assert_eq!(results[0].size_bytes, 2_147_483_648);
        assert_eq!(results[0].season, Some(1));
        assert_eq!(results[0].episode, Some(2));
    }

    #[tokio::test]
    async fn no_imdb_id_means_no_query() {
        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = EztvDriver::new(fetcher);
        let request = SearchRequest::new(ContentId::Kitsu { id: 1 }, MediaType::Series);
        let query = SearchQuery::from_request(&request, Some("Some Show"));
        assert!(driver.search(&query).await.is_empty());
    }

    #[test]
    fn only_series_supported() {
        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = EztvDriver::new(fetcher);
        assert!(driver.supports(MediaType::Series));
        assert!(!driver.supports(MediaType::Movie));
    }
}
