//! Cinemeta metadata client
//!
//! Resolves an IMDB id to its canonical display title via the public
//! metadata service. Responses are cached in-process for a day; the
//! service virtually never renames a title.

use crate::cache::MemoryCache;
use async_trait::async_trait;
use magnetarr_core::{MagnetarrError, MediaType, Result, TitleResolver};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://v3-cinemeta.strem.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const TITLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct MetaResponse {
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    name: String,
}

pub struct CinemetaClient {
    client: Client,
    base_url: String,
    cache: MemoryCache,
}

impl CinemetaClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MagnetarrError::ConfigurationError {
                field: "cinemeta_client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            cache: MemoryCache::new(),
        })
    }

    /// Cinemeta knows two catalogs; anime titles live under series.
    fn catalog_of(media_type: MediaType) -> &'static str {
        match media_type {
            MediaType::Movie => "movie",
            MediaType::Series | MediaType::Anime => "series",
        }
    }
}

#[async_trait]
impl TitleResolver for CinemetaClient {
    async fn resolve_title(&self, media_type: MediaType, imdb_id: &str) -> Result<String> {
        let catalog = Self::catalog_of(media_type);
        let cache_key = format!("title:{}:{}", catalog, imdb_id);
        if let Some(title) = self.cache.get::<String>(&cache_key).await {
            return Ok(title);
        }

        let url = format!(
            "{}/meta/{}/{}.json",
            self.base_url.trim_end_matches('/'),
            catalog,
            imdb_id
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MagnetarrError::NetworkError {
                url: url.clone(),
                error: e.to_string(),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        if !response.status().is_success() {
            return Err(MagnetarrError::ExternalServiceError {
                service: "cinemeta".to_string(),
                error: format!("{} for {}", response.status(), imdb_id),
            });
        }

        let parsed: MetaResponse = response
            .json()
            .await
            .map_err(|e| MagnetarrError::SerializationError(e.to_string()))?;
        let title = parsed
            .meta
            .map(|m| m.name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| MagnetarrError::NotFound {
                resource: format!("title for {}", imdb_id),
            })?;

        debug!(imdb_id, title = %title, "resolved display title");
        if let Err(e) = self.cache.set(&cache_key, &title, TITLE_TTL).await {
            debug!(error = %e, "title cache write failed");
        }
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_and_caches_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/movie/tt15398776.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"name": "Oppenheimer", "releaseInfo": "2023", "genres": ["Drama"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CinemetaClient::with_base_url(server.uri()).unwrap();
        let first = client
            .resolve_title(MediaType::Movie, "tt15398776")
            .await
            .unwrap();
        // Second hit must come from the cache: the mock allows one call.
        let second = client
            .resolve_title(MediaType::Movie, "tt15398776")
            .await
            .unwrap();
        assert_eq!(first, "Oppenheimer");
        assert_eq!(second, "Oppenheimer");
        server.verify().await;
    }

    #[tokio::test]
    async fn anime_uses_series_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/series/tt2560140.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"name": "Attack on Titan"}
            })))
            .mount(&server)
            .await;

        let client = CinemetaClient::with_base_url(server.uri()).unwrap();
        let title = client
            .resolve_title(MediaType::Anime, "tt2560140")
            .await
            .unwrap();
        assert_eq!(title, "Attack on Titan");
    }

    #[tokio::test]
    async fn missing_meta_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CinemetaClient::with_base_url(server.uri()).unwrap();
        let err = client
            .resolve_title(MediaType::Movie, "tt0000000")
            .await
            .unwrap_err();
        assert!(matches!(err, MagnetarrError::ExternalServiceError { .. }));
    }
}
