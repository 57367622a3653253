//! Template-driven generic driver
//!
//! Runs any synced definition: renders the search path template, walks the
//! mirror list until a non-blocked response, then extracts rows with the
//! definition's selectors (HTML), dotted paths (JSON) or element names
//! (RSS).

use crate::definitions::DefinitionStore;
use crate::drivers::TorrentDriver;
use crate::rss;
use crate::sizeparse::parse_size;
use crate::template::{PathTemplate, TemplateVars};
use async_trait::async_trait;
use magnetarr_core::{
    info_hash_from_magnet, normalize_info_hash, retry_transient, HttpMethod, IndexerDefinition,
    MediaType, Resolution, ResponseKind, RetryConfig, SearchQuery, SelectorSet, Torrent,
    TorrentExtras,
};
use magnetarr_fetch::{FetchOptions, ProtectedFetcher};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Mirrors tried per search path.
const MAX_DOMAINS: usize = 5;

pub struct GenericDriver {
    definition: IndexerDefinition,
    domains: Vec<String>,
    fetcher: Arc<ProtectedFetcher>,
    /// Slow-tier drivers may spend a solver attempt; fast-tier ones never
    /// do.
    allow_solver: bool,
    timeout: Duration,
}

impl GenericDriver {
    pub fn new(
        definition: IndexerDefinition,
        domains: Vec<String>,
        fetcher: Arc<ProtectedFetcher>,
        allow_solver: bool,
    ) -> Self {
        Self {
            definition,
            domains,
            fetcher,
            allow_solver,
            timeout: Duration::from_secs(10),
        }
    }

    /// Build a driver for an id present in the store; `None` when the
    /// definition is missing or unusable.
    pub async fn for_indexer(
        id: &str,
        store: &DefinitionStore,
        fetcher: Arc<ProtectedFetcher>,
        allow_solver: bool,
    ) -> Option<Self> {
        let definition = store.get(id).await?;
        let domains = store.domains(id).await;
        if domains.is_empty() || definition.search_paths.is_empty() {
            return None;
        }
        Some(Self::new(definition, domains, fetcher, allow_solver))
    }

    async fn search_inner(&self, query: &SearchQuery) -> Vec<Torrent> {
        let vars = TemplateVars {
            keywords: query.keywords.clone(),
            imdb_id: query.imdb_id.clone(),
            page: query.page,
        };
        let opts = FetchOptions {
            timeout: self.timeout,
            use_solver: self.allow_solver,
        };
        let retry = RetryConfig::default();

        for path in &self.definition.search_paths {
            if path.method == HttpMethod::Post {
                debug!(indexer = %self.definition.id, "post search paths unsupported");
                continue;
            }
            let template = match PathTemplate::parse(&path.path) {
                Ok(template) => template,
                Err(e) => {
                    debug!(indexer = %self.definition.id, error = %e, "search path unusable");
                    continue;
                }
            };
            let rendered = template.render(&vars);

            for domain in self.domains.iter().take(MAX_DOMAINS) {
                let url = format!(
                    "{}/{}",
                    domain.trim_end_matches('/'),
                    rendered.trim_start_matches('/')
                );
                let outcome = match retry_transient(&retry, "generic search", || {
                    self.fetcher.fetch(&url, &opts)
                })
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        debug!(indexer = %self.definition.id, url, error = %e, "mirror fetch failed");
                        continue;
                    }
                };
                if outcome.is_blocked() {
                    debug!(indexer = %self.definition.id, url, challenge = ?outcome.challenge, "mirror blocked");
                    continue;
                }
                if !(200..400).contains(&outcome.status) {
                    debug!(indexer = %self.definition.id, url, status = outcome.status, "mirror error status");
                    continue;
                }

                // First non-blocked response is the one we extract from.
                let results = match path.kind {
                    ResponseKind::Html => extract_html(
                        &self.definition.selectors,
                        &outcome.body,
                        &self.definition.id,
                        query,
                    ),
                    ResponseKind::Json => extract_json(
                        &self.definition.selectors,
                        &outcome.body,
                        &self.definition.id,
                        query,
                    ),
                    ResponseKind::Rss => extract_rss(
                        &self.definition.selectors,
                        &outcome.body,
                        &self.definition.id,
                        query,
                    ),
                };
                if results.is_empty() {
                    // Page answered but matched nothing; try the next path.
                    break;
                }
                return results;
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl TorrentDriver for GenericDriver {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn supports(&self, media: MediaType) -> bool {
        self.definition.supports(media)
    }

    async fn search(&self, query: &SearchQuery) -> Vec<Torrent> {
        self.search_inner(query).await
    }
}

/// One extracted row before torrent assembly.
#[derive(Debug, Default)]
struct RawRow {
    title: Option<String>,
    magnet: Option<String>,
    infohash: Option<String>,
    size: Option<String>,
    seeders: Option<String>,
    details: Option<String>,
}

impl RawRow {
    fn into_torrent(self, provider: &str, query: &SearchQuery) -> Option<Torrent> {
        let title = self.title?;
        let info_hash = self
            .infohash
            .as_deref()
            .and_then(normalize_info_hash)
            .or_else(|| self.magnet.as_deref().and_then(info_hash_from_magnet))?;
        let magnet_uri = self
            .magnet
            .filter(|m| m.starts_with("magnet:"))
            .unwrap_or_else(|| Torrent::magnet_for(&info_hash, &title));

        Some(Torrent {
            magnet_uri,
            resolution: Resolution::from_title(&title),
            info_hash,
            size_bytes: self.size.as_deref().and_then(parse_size).unwrap_or(0),
            seeders: self
                .seeders
                .as_deref()
                .map(|s| s.replace(',', ""))
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            uploaded_at: None,
            provider: provider.to_string(),
            media_type: query.media_type,
            imdb_id: query.imdb_id.clone(),
            kitsu_id: query.kitsu_id,
            season: query.season,
            episode: query.episode,
            title,
            extras: TorrentExtras {
                info_url: self.details,
                ..TorrentExtras::default()
            },
        })
    }
}

fn extract_html(
    selectors: &SelectorSet,
    body: &str,
    provider: &str,
    query: &SearchQuery,
) -> Vec<Torrent> {
    let Ok(row_selector) = Selector::parse(&selectors.rows) else {
        warn!(provider, rows = %selectors.rows, "invalid row selector");
        return Vec::new();
    };
    let document = Html::parse_document(body);

    let field_of = |row: scraper::ElementRef<'_>, name: &str| -> Option<String> {
        let field = selectors.fields.get(name)?;
        let selector = Selector::parse(&field.selector).ok()?;
        let element = row.select(&selector).next()?;
        let value = match &field.attribute {
            Some(attribute) => element.value().attr(attribute)?.to_string(),
            None => element.text().collect::<String>(),
        };
        let value = value.trim().to_string();
        (!value.is_empty()).then_some(value)
    };

    document
        .select(&row_selector)
        .filter_map(|row| {
            RawRow {
                title: field_of(row, "title"),
                magnet: field_of(row, "magnet"),
                infohash: field_of(row, "infohash"),
                size: field_of(row, "size"),
                seeders: field_of(row, "seeders"),
                details: field_of(row, "details"),
            }
            .into_torrent(provider, query)
        })
        .collect()
}

fn extract_json(
    selectors: &SelectorSet,
    body: &str,
    provider: &str,
    query: &SearchQuery,
) -> Vec<Torrent> {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let rows = match json_path(&root, &selectors.rows) {
        Some(serde_json::Value::Array(rows)) => rows.clone(),
        // An empty rows selector means the document itself is the array.
        None if selectors.rows.is_empty() => root.as_array().cloned().unwrap_or_default(),
        _ => Vec::new(),
    };

    let field_of = |row: &serde_json::Value, name: &str| -> Option<String> {
        let field = selectors.fields.get(name)?;
        let value = json_path(row, &field.selector)?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    rows.iter()
        .filter_map(|row| {
            RawRow {
                title: field_of(row, "title"),
                magnet: field_of(row, "magnet"),
                infohash: field_of(row, "infohash"),
                size: field_of(row, "size"),
                seeders: field_of(row, "seeders"),
                details: field_of(row, "details"),
            }
            .into_torrent(provider, query)
        })
        .collect()
}

fn extract_rss(
    selectors: &SelectorSet,
    body: &str,
    provider: &str,
    query: &SearchQuery,
) -> Vec<Torrent> {
    let element_for = |name: &str, default: &str| -> String {
        selectors
            .fields
            .get(name)
            .map(|f| f.selector.clone())
            .unwrap_or_else(|| default.to_string())
    };
    let title_el = element_for("title", "title");
    let magnet_el = element_for("magnet", "link");
    let infohash_el = element_for("infohash", "infoHash");
    let size_el = element_for("size", "size");
    let seeders_el = element_for("seeders", "seeders");

    rss::parse_items(body)
        .into_iter()
        .filter_map(|item| {
            RawRow {
                title: item.get(&title_el).map(str::to_string),
                magnet: item.get(&magnet_el).map(str::to_string),
                infohash: item.get(&infohash_el).map(str::to_string),
                size: item.get(&size_el).map(str::to_string),
                seeders: item.get(&seeders_el).map(str::to_string),
                details: None,
            }
            .into_torrent(provider, query)
        })
        .collect()
}

/// Resolve a dotted path (`data.movies`) inside a JSON value.
fn json_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnetarr_core::{
        ContentId, FieldSelector, SearchPath, SearchRequest, Visibility,
    };
    use magnetarr_fetch::SessionCache;
    use std::collections::{BTreeSet, HashMap};
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html_definition(id: &str) -> IndexerDefinition {
        let mut fields = HashMap::new();
        fields.insert(
            "title".to_string(),
            FieldSelector {
                selector: "td.name a".to_string(),
                attribute: None,
            },
        );
        fields.insert(
            "magnet".to_string(),
            FieldSelector {
                selector: "td.dl a".to_string(),
                attribute: Some("href".to_string()),
            },
        );
        fields.insert(
            "size".to_string(),
            FieldSelector {
                selector: "td.size".to_string(),
                attribute: None,
            },
        );
        fields.insert(
            "seeders".to_string(),
            FieldSelector {
                selector: "td.seeds".to_string(),
                attribute: None,
            },
        );
        IndexerDefinition {
            id: id.to_string(),
            display_name: id.to_string(),
            language: None,
            visibility: Visibility::Public,
            links: vec![],
            search_paths: vec![SearchPath {
                path: "/search/{{ .Keywords }}".to_string(),
                method: HttpMethod::Get,
                kind: ResponseKind::Html,
            }],
            content_types: BTreeSet::from([MediaType::Movie]),
            selectors: SelectorSet {
                rows: "table tr.result".to_string(),
                fields,
            },
        }
    }

    fn movie_query() -> SearchQuery {
        let request = SearchRequest::new(
            ContentId::Imdb { id: "tt15398776".to_string() },
            MediaType::Movie,
        );
        SearchQuery::from_request(&request, Some("Oppenheimer"))
    }

    const HTML_PAGE: &str = r#"<html><body><table>
      <tr class="result">
        <td class="name"><a href="/t/1">Oppenheimer 2023 1080p</a></td>
        <td class="dl"><a href="magnet:?xt=urn:btih:0a1b2c3d4e5f60718293a4b5c6d7e8f901234567&dn=x">dl</a></td>
        <td class="size">4.0 GB</td>
        <td class="seeds">1,204</td>
      </tr>
      <tr class="result">
        <td class="name"><a href="/t/2">Row without magnet</a></td>
        <td class="size">1.0 GB</td>
        <td class="seeds">3</td>
      </tr>
    </table></body></html>"#;

    #[tokio::test]
    async fn html_extraction_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/search/Oppenheimer"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HTML_PAGE))
            .mount(&server)
            .await;

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = GenericDriver::new(
            html_definition("uindex"),
            vec![server.uri()],
            fetcher,
            false,
        );

        let results = driver.search(&movie_query()).await;
        assert_eq!(results.len(), 1);
        let torrent = &results[0];
        assert_eq!(torrent.title, "Oppenheimer 2023 1080p");
        assert_eq!(torrent.info_hash, "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567");
        assert_eq!(torrent.size_bytes, 4 * 1024 * 1024 * 1024);
        assert_eq!(torrent.seeders, 1204);
        assert_eq!(torrent.provider, "uindex");
    }

    #[tokio::test]
    async fn blocked_mirror_falls_through_to_next() {
        let blocked = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_string("<title>Just a moment...</title>"),
            )
            .mount(&blocked)
            .await;

        let healthy = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HTML_PAGE))
            .mount(&healthy)
            .await;

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = GenericDriver::new(
            html_definition("uindex"),
            vec![blocked.uri(), healthy.uri()],
            fetcher,
            false,
        );

        let results = driver.search(&movie_query()).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn unusable_template_means_empty() {
        let server = MockServer::start().await;
        let mut definition = html_definition("uindex");
        definition.search_paths[0].path = "/search/{{ .Unknown.Thing }}".to_string();

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = GenericDriver::new(definition, vec![server.uri()], fetcher, false);
        assert!(driver.search(&movie_query()).await.is_empty());
        // No request must have been made with a malformed URL.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "results": [
                    {"name": "Oppenheimer 2160p", "hash": "0A1B2C3D4E5F60718293A4B5C6D7E8F901234567",
                     "size": "21474836480", "peers": {"seeders": 99}}
                ]}
            })))
            .mount(&server)
            .await;

        let mut fields = HashMap::new();
        for (name, selector) in [
            ("title", "name"),
            ("infohash", "hash"),
            ("size", "size"),
            ("seeders", "peers.seeders"),
        ] {
            fields.insert(
                name.to_string(),
                FieldSelector {
                    selector: selector.to_string(),
                    attribute: None,
                },
            );
        }
        let mut definition = html_definition("bitsearch");
        definition.search_paths[0].kind = ResponseKind::Json;
        definition.selectors = SelectorSet {
            rows: "data.results".to_string(),
            fields,
        };

        let fetcher = Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap());
        let driver = GenericDriver::new(definition, vec![server.uri()], fetcher, false);

        let results = driver.search(&movie_query()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seeders, 99);
        assert_eq!(results[0].resolution, Resolution::R2160p);
    }
}
