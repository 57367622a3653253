//! Nyaa driver
//!
//! Anime RSS feed with infohash/seeder/size extensions. Full-text only,
//! so the human-readable title query matters here.

use super::{TorrentDriver, DRIVER_HTTP_TIMEOUT};
use crate::rss;
use crate::sizeparse::parse_size;
use async_trait::async_trait;
use chrono::DateTime;
use magnetarr_core::{
    normalize_info_hash, retry_transient, MediaType, Resolution, Result, RetryConfig, SearchQuery,
    Torrent, TorrentExtras,
};
use magnetarr_fetch::{FetchOptions, ProtectedFetcher};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MIRRORS: [&str; 1] = ["https://nyaa.si"];

/// Anime category filter (English-translated + raw).
const CATEGORY: &str = "1_0";

pub struct NyaaDriver {
    fetcher: Arc<ProtectedFetcher>,
    mirrors: Vec<String>,
}

impl NyaaDriver {
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
        // Prefer the resolved title over the keyword string: the keyword
        // string may carry an SxxEyy tag that nyaa naming rarely uses.
        let mut term = query.title.clone().unwrap_or_else(|| query.keywords.clone());
        if let Some(episode) = query.episode {
            term = format!("{} {:02}", term, episode);
        }

        let opts = FetchOptions::default().timeout(DRIVER_HTTP_TIMEOUT);
        let retry = RetryConfig::default();
        let mut last_err = None;

        for mirror in &self.mirrors {
            let url = format!(
                "{}/?page=rss&c={}&f=0&q={}",
                mirror,
                CATEGORY,
                urlencoding::encode(&term)
            );
            let outcome = match retry_transient(&retry, "nyaa search", || {
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
                debug!(mirror, status = outcome.status, challenge = ?outcome.challenge, "nyaa mirror unusable");
                continue;
            }
            return Ok(self.parse_feed(&outcome.body, query));
        }

        if let Some(e) = last_err {
            return Err(e);
        }
        Ok(Vec::new())
    }

    fn parse_feed(&self, xml: &str, query: &SearchQuery) -> Vec<Torrent> {
        let mut results = Vec::new();
        for item in rss::parse_items(xml) {
            let Some(title) = item.get("title").map(str::to_string) else {
                continue;
            };
            let Some(info_hash) = item.get("nyaa:infoHash").and_then(normalize_info_hash) else {
                continue;
            };
            let seeders = item
                .get("nyaa:seeders")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let size_bytes = item.get("nyaa:size").and_then(parse_size).unwrap_or(0);
            let uploaded_at = item
                .get("pubDate")
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&chrono::Utc));
            let trusted = item
                .get("nyaa:trusted")
                .map(|t| t.eq_ignore_ascii_case("yes"))
                .unwrap_or(false);

            results.push(Torrent {
                magnet_uri: Torrent::magnet_for(&info_hash, &title),
                resolution: Resolution::from_title(&title),
                info_hash,
                title,
                size_bytes,
                seeders,
                uploaded_at,
                provider: self.id().to_string(),
                media_type: MediaType::Anime,
                imdb_id: query.imdb_id.clone(),
                kitsu_id: query.kitsu_id,
                season: query.season,
                episode: query.episode,
                extras: TorrentExtras {
                    trusted,
                    ..TorrentExtras::default()
                },
            });
        }
        results
    }
}

#[async_trait]
impl TorrentDriver for NyaaDriver {
    fn id(&self) -> &str {
        "nyaasi"
    }

    fn supports(&self, media: MediaType) -> bool {
        media == MediaType::Anime
    }

    async fn search(&self, query: &SearchQuery) -> Vec<Torrent> {
        match self.search_inner(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "nyaa search failed");
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
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:nyaa="https://nyaa.si/xmlns/nyaa">
<channel>
  <item>
    <title>[SubGroup] Frieren - 12 [1080p]</title>
    <nyaa:seeders>321</nyaa:seeders>
    <nyaa:infoHash>0a1b2c3d4e5f60718293a4b5c6d7e8f901234567</nyaa:infoHash>
    <nyaa:size>1.4 GiB</nyaa:size>
    <nyaa:trusted>Yes</nyaa:trusted>
    <pubDate>Mon, 01 Jul 2024 10:00:00 -0000</pubDate>
  </item>
  <item>
    <title>Entry without hash</title>
    <nyaa:seeders>5</nyaa:seeders>
  </item>
</channel>
</rss>"#;

    fn query() -> SearchQuery {
        let request = SearchRequest::new(ContentId::Kitsu { id: 44042 }, MediaType::Anime)
            .with_episode(None, Some(12));
        SearchQuery::from_request(&request, Some("Frieren"))
    }

    #[tokio::test]
    async fn parses_feed_and_skips_hashless_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "rss"))
            .and(query_param("q", "Frieren 12"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(FEED),
            )
            .mount(&server)
            .await;

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = NyaaDriver::with_mirrors(fetcher, vec![server.uri()]);

        let results = driver.search(&query()).await;
        assert_eq!(results.len(), 1);
        let torrent = &results[0];
        assert_eq!(torrent.title, "[SubGroup] Frieren - 12 [1080p]");
        assert_eq!(torrent.seeders, 321);
        assert_eq!(torrent.size_bytes, (1.4 * 1024.0 * 1024.0 * 1024.0) as i64);
        assert_eq!(torrent.media_type, MediaType::Anime);
        assert_eq!(torrent.kitsu_id, Some(44042));
        assert!(torrent.extras.trusted);
        assert!(torrent.uploaded_at.is_some());
    }

    #[test]
    fn only_anime_supported() {
        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = NyaaDriver::new(fetcher);
        assert!(driver.supports(MediaType::Anime));
        assert!(!driver.supports(MediaType::Movie));
        assert!(!driver.supports(MediaType::Series));
    }
}
